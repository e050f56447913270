//! Audit event storage and retrieval.
//!
//! Every local write records who changed which record and how.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    /// External id assigned or cleared.
    ExternalIdChanged,
    RevisionCreated,
    RevisionPublished,
    RelatedCreated,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RecordCreated => "record_created",
            Self::RecordUpdated => "record_updated",
            Self::RecordDeleted => "record_deleted",
            Self::ExternalIdChanged => "external_id_changed",
            Self::RevisionCreated => "revision_created",
            Self::RevisionPublished => "revision_published",
            Self::RelatedCreated => "related_created",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "record_created" => Self::RecordCreated,
            "record_updated" => Self::RecordUpdated,
            "record_deleted" => Self::RecordDeleted,
            "external_id_changed" => Self::ExternalIdChanged,
            "revision_created" => Self::RevisionCreated,
            "revision_published" => Self::RevisionPublished,
            "related_created" => Self::RelatedCreated,
            _ => return None,
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for one record, newest first.
///
/// Rows with an unrecognized event type are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let kind: String = row.get(3)?;
        let Some(event_type) = EventType::parse(&kind) else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("blog.Post", "1", EventType::RecordCreated, "test-actor")
            .with_comment("import");
        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let changed = Event::new("blog.Post", "1", EventType::ExternalIdChanged, "test-actor")
            .with_values(None, Some("rec1".into()));
        insert_event(&conn, &changed).unwrap();

        let events = get_events(&conn, "blog.Post", "1", Some(10)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::ExternalIdChanged);
        assert_eq!(events[0].new_value.as_deref(), Some("rec1"));
        assert_eq!(events[1].comment.as_deref(), Some("import"));
    }
}
