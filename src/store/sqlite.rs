use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use rusqlite_migration::{Migrations, M};

use crate::app::{AdwatchError, Result};
use crate::domain::Item;
use crate::store::{IdentityStore, KnownPost};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`. Existing rows are never touched.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;
        migrations.to_latest(&mut conn)?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AdwatchError::StoreUnavailable(e.to_string()))
    }

    // Fixed-width UTC so timestamps compare correctly as text.
    fn format_timestamp(dt: DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }
}

impl IdentityStore for SqliteStore {
    fn load(&self) -> Result<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM posts")?;

        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;

        Ok(ids)
    }

    fn save(&self, items: &[Item]) -> Result<usize> {
        let mut conn = self.conn()?;
        let now = Self::format_timestamp(Utc::now());

        let tx = conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO posts (id, title, first_seen_at) VALUES (?1, ?2, ?3)",
            )?;
            for item in items {
                count += stmt.execute(params![item.identifier, item.title, now])?;
            }
        }

        tx.commit()?;
        Ok(count)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn recent(&self, limit: usize) -> Result<Vec<KnownPost>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, first_seen_at FROM posts
             ORDER BY first_seen_at DESC, id LIMIT ?1",
        )?;

        let posts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(KnownPost {
                    identifier: row.get(0)?,
                    title: row.get(1)?,
                    first_seen_at: row
                        .get::<_, String>(2)
                        .ok()
                        .and_then(|s| Self::parse_timestamp(&s))
                        .unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM posts WHERE first_seen_at < ?1",
            params![Self::format_timestamp(cutoff)],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IdentityRule, RawItem};
    use chrono::Duration;

    fn item(link: &str, title: &str) -> Item {
        Item::from_raw(&RawItem::new(link, title), IdentityRule::Link).unwrap()
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_save_and_load() {
        let store = SqliteStore::in_memory().unwrap();
        let count = store
            .save(&[item("u1", "Car A"), item("u2", "Car B")])
            .unwrap();
        assert_eq!(count, 2);

        let known = store.load().unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("u1"));
        assert!(known.contains("u2"));
    }

    #[test]
    fn test_save_is_idempotent_and_first_write_wins() {
        let store = SqliteStore::in_memory().unwrap();
        store.save(&[item("u1", "Original")]).unwrap();

        let count = store.save(&[item("u1", "Renamed")]).unwrap();
        assert_eq!(count, 0);

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title.as_deref(), Some("Original"));
    }

    #[test]
    fn test_duplicate_in_same_batch_inserted_once() {
        let store = SqliteStore::in_memory().unwrap();
        let count = store
            .save(&[item("u1", "Car A"), item("u1", "Car A again")])
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_reopen_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("known_posts.db");

        {
            let store = SqliteStore::new(&path).unwrap();
            store.save(&[item("u1", "Car A")]).unwrap();
        }

        // Second open runs migrations against an existing schema.
        let store = SqliteStore::new(&path).unwrap();
        let known = store.load().unwrap();
        assert_eq!(known.len(), 1);
        assert!(known.contains("u1"));
    }

    #[test]
    fn test_recent_respects_limit() {
        let store = SqliteStore::in_memory().unwrap();
        let items: Vec<Item> = (0..5)
            .map(|i| item(&format!("https://example.com/{}", i), "x"))
            .collect();
        store.save(&items).unwrap();

        assert_eq!(store.recent(3).unwrap().len(), 3);
        assert_eq!(store.recent(10).unwrap().len(), 5);
    }

    #[test]
    fn test_prune_only_removes_older_rows() {
        let store = SqliteStore::in_memory().unwrap();
        store.save(&[item("u1", "Car A")]).unwrap();

        let removed = store
            .prune_older_than(Utc::now() - Duration::days(30))
            .unwrap();
        assert_eq!(removed, 0);
        assert!(store.load().unwrap().contains("u1"));

        let removed = store
            .prune_older_than(Utc::now() + Duration::seconds(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.load().unwrap().is_empty());
    }
}
