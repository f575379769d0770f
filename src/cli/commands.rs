use crate::app::{AppContext, Result};
use crate::config::{Config, ConfigError};
use crate::coordinator::{spawn_shutdown_listener, CoordinatorConfig, CycleOutcome};
use crate::store::IdentityStore;

pub async fn run(config: Config, interval: Option<&str>, no_initial_cycle: bool) -> Result<()> {
    let mut coordinator_config = AppContext::coordinator_config(&config);
    if let Some(interval) = interval {
        coordinator_config.interval =
            CoordinatorConfig::parse_interval(interval).map_err(ConfigError::Invalid)?;
    }
    coordinator_config.run_on_start = !no_initial_cycle;

    let ctx = AppContext::with_coordinator_config(config, coordinator_config)?;
    let shutdown = spawn_shutdown_listener();

    ctx.coordinator.run(shutdown).await;
    Ok(())
}

pub async fn once(config: Config) -> Result<()> {
    let ctx = AppContext::new(config)?;
    let report = ctx.coordinator.run_cycle().await;
    ctx.coordinator.log_report(&report);

    match report.outcome {
        CycleOutcome::Skipped => println!("Cycle skipped: identity store unavailable"),
        CycleOutcome::NoNewItems => println!("No new posts"),
        CycleOutcome::Notified => println!("{} new post(s), notification sent", report.new_items),
        CycleOutcome::NotifyFailed => println!(
            "{} new post(s) saved, notification failed",
            report.new_items
        ),
        CycleOutcome::PersistFailed => println!(
            "{} new post(s) found but could not be saved",
            report.new_items
        ),
    }

    for label in &report.failed_sources {
        eprintln!("  Failed to fetch {}", label);
    }

    Ok(())
}

pub fn known(config: Config, limit: usize) -> Result<()> {
    let ctx = AppContext::new(config)?;
    let total = ctx.store.count()?;

    if total == 0 {
        println!("No known posts");
        return Ok(());
    }

    println!("{} known post(s)", total);
    for post in ctx.store.recent(limit)? {
        println!(
            "{}  {}\n  {}",
            post.first_seen_at.format("%Y-%m-%d %H:%M"),
            post.title.as_deref().unwrap_or("(untitled)"),
            post.identifier
        );
    }

    Ok(())
}
