//! Domain events exchanged between services over the event bus.
//!
//! Each routing key has exactly one payload schema. Payloads travel as JSON
//! objects with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exchange carrying identity lifecycle events.
pub const USER_EVENTS_EXCHANGE: &str = "user_events";
/// Exchange carrying todo lifecycle events.
pub const TODO_EVENTS_EXCHANGE: &str = "todo_events";

pub const USER_REGISTERED: &str = "user.registered";
pub const USER_LOGGED_IN: &str = "user.logged_in";
pub const TODO_CREATED: &str = "todo.created";
pub const TODO_DELETED: &str = "todo.deleted";

/// Queue the user service consumes identity events from.
pub const USER_SERVICE_QUEUE: &str = "user_service_queue";
/// Queue the user service consumes todo events from.
pub const USER_TODO_QUEUE: &str = "user_todo_queue";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserRegistered {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserLoggedIn {
    pub user_id: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TodoCreated {
    pub todo_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TodoDeleted {
    pub todo_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A domain event, one variant per routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    UserRegistered(UserRegistered),
    UserLoggedIn(UserLoggedIn),
    TodoCreated(TodoCreated),
    TodoDeleted(TodoDeleted),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Unknown routing key: {0}")]
    UnknownRoutingKey(String),

    #[error("Malformed {routing_key} payload: {source}")]
    Schema {
        routing_key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Empty {field} in {routing_key} payload")]
    EmptyField {
        routing_key: String,
        field: &'static str,
    },
}

impl DomainEvent {
    pub fn user_registered(user_id: impl Into<String>, email: &str, name: &str) -> Self {
        DomainEvent::UserRegistered(UserRegistered {
            user_id: user_id.into(),
            email: email.to_string(),
            name: name.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn user_logged_in(user_id: impl Into<String>, email: &str) -> Self {
        DomainEvent::UserLoggedIn(UserLoggedIn {
            user_id: user_id.into(),
            email: email.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn todo_created(todo_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        DomainEvent::TodoCreated(TodoCreated {
            todo_id: todo_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn todo_deleted(todo_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        DomainEvent::TodoDeleted(TodoDeleted {
            todo_id: todo_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn exchange(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered(_) | DomainEvent::UserLoggedIn(_) => USER_EVENTS_EXCHANGE,
            DomainEvent::TodoCreated(_) | DomainEvent::TodoDeleted(_) => TODO_EVENTS_EXCHANGE,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered(_) => USER_REGISTERED,
            DomainEvent::UserLoggedIn(_) => USER_LOGGED_IN,
            DomainEvent::TodoCreated(_) => TODO_CREATED,
            DomainEvent::TodoDeleted(_) => TODO_DELETED,
        }
    }

    /// User the event concerns.
    pub fn user_id(&self) -> &str {
        match self {
            DomainEvent::UserRegistered(e) => &e.user_id,
            DomainEvent::UserLoggedIn(e) => &e.user_id,
            DomainEvent::TodoCreated(e) => &e.user_id,
            DomainEvent::TodoDeleted(e) => &e.user_id,
        }
    }

    /// Serialize the payload for the wire.
    pub fn payload(&self) -> serde_json::Value {
        let value = match self {
            DomainEvent::UserRegistered(e) => serde_json::to_value(e),
            DomainEvent::UserLoggedIn(e) => serde_json::to_value(e),
            DomainEvent::TodoCreated(e) => serde_json::to_value(e),
            DomainEvent::TodoDeleted(e) => serde_json::to_value(e),
        };
        // Plain structs with string/timestamp fields always serialize.
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Decode a payload according to its routing key.
    pub fn decode(routing_key: &str, payload: serde_json::Value) -> Result<Self, EventDecodeError> {
        let event = match routing_key {
            USER_REGISTERED => DomainEvent::UserRegistered(parse(routing_key, payload)?),
            USER_LOGGED_IN => DomainEvent::UserLoggedIn(parse(routing_key, payload)?),
            TODO_CREATED => DomainEvent::TodoCreated(parse(routing_key, payload)?),
            TODO_DELETED => DomainEvent::TodoDeleted(parse(routing_key, payload)?),
            other => return Err(EventDecodeError::UnknownRoutingKey(other.to_string())),
        };
        event.check_ids()?;
        Ok(event)
    }

    fn check_ids(&self) -> Result<(), EventDecodeError> {
        let empty = |field: &'static str| EventDecodeError::EmptyField {
            routing_key: self.routing_key().to_string(),
            field,
        };

        if self.user_id().trim().is_empty() {
            return Err(empty("userId"));
        }
        match self {
            DomainEvent::TodoCreated(TodoCreated { todo_id, .. })
            | DomainEvent::TodoDeleted(TodoDeleted { todo_id, .. })
                if todo_id.trim().is_empty() =>
            {
                Err(empty("todoId"))
            }
            _ => Ok(()),
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    routing_key: &str,
    payload: serde_json::Value,
) -> Result<T, EventDecodeError> {
    serde_json::from_value(payload).map_err(|source| EventDecodeError::Schema {
        routing_key: routing_key.to_string(),
        source,
    })
}
