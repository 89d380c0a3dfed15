use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::types::source_key::SourceKey;

/// Nickname stored for comments posted without an author.
pub const GUEST_NICKNAME: &str = "Гость";

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub source: SourceKey,
    pub source_id: String,
    pub occurred_at: DateTime<Tz>,
    pub nickname: String,
    pub body: String,
}

/// Unparsed fields found next to one comment identifier on the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawFields {
    pub author: Option<String>,
    pub time: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawItem {
    pub id: String,
    pub fields: RawFields,
}

impl RawItem {
    pub fn new(id: impl Into<String>, fields: RawFields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Everything currently rendered on the page, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub items: Vec<RawItem>,
    /// Progress marker exposed by the page (e.g. the load-more cursor).
    pub marker: Option<String>,
}

impl Snapshot {
    pub fn id_count(&self) -> usize {
        self.items.iter().filter(|item| !item.id.is_empty()).count()
    }
}
