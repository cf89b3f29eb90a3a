use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::entity::{Entity, RelationDef};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Entity for Event {
    const TABLE: &'static str = "event";
    const COLUMNS: &'static [&'static str] = &["name", "description", "venue", "starts_at"];
    const SEARCHABLE: &'static [&'static str] = &["name", "description", "venue"];
    const RELATIONS: &'static [RelationDef] = &[RelationDef {
        name: "tags",
        join_table: "event_tag",
        local_key: "event_id",
        foreign_key: "tag_id",
    }];

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EventOut {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub venue: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl From<Event> for EventOut {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            name: event.name,
            description: event.description,
            venue: event.venue,
            starts_at: event.starts_at,
            created: event.created,
            updated: event.updated,
        }
    }
}
