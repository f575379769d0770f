use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A post as handed back by a fetcher, before identity is derived.
///
/// An empty `link` means the post had no usable anchor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub link: String,
    pub text: String,
}

impl RawItem {
    pub fn new(link: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            text: text.into(),
        }
    }
}

/// How an [`Item`] identifier is derived from a fetched post.
///
/// Switching rules on an existing database makes every listing look new once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRule {
    /// The trimmed absolute link.
    #[default]
    Link,
    /// Hex SHA-256 of the title and the link, newline separated.
    TitleAndLink,
}

impl IdentityRule {
    pub fn identify(&self, title: &str, link: &str) -> String {
        match self {
            IdentityRule::Link => link.to_string(),
            IdentityRule::TitleAndLink => {
                let mut hasher = Sha256::new();
                hasher.update(title.as_bytes());
                hasher.update(b"\n");
                hasher.update(link.as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// A listing with a stable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub identifier: String,
    pub title: String,
    pub link: String,
}

impl Item {
    /// Derive an item from a raw post, or `None` if the post has no link.
    pub fn from_raw(raw: &RawItem, rule: IdentityRule) -> Option<Self> {
        let link = raw.link.trim();
        if link.is_empty() {
            return None;
        }

        let title = raw.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let identifier = rule.identify(&title, link);

        Some(Self {
            identifier,
            title,
            link: link.to_string(),
        })
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        }
    }
}
