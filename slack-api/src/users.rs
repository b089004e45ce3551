//! # Workspace users
//!
//! ```rust,no_run
//! use slack_api::prelude::*;
//!
//! # async fn example(client: &SlackClient) {
//! let users = client.collect::<User>(&users_request()).await;
//! if !users.is_complete() {
//!     eprintln!("user list may be incomplete: {}", users.outcome);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paged::PageRequest;

/// A workspace member, as returned by `users.list`.
///
/// The record is kept exactly as received.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct User {
    pub fields: Map<String, Value>,
}

impl User {
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }
}

/// `users.list`, all workspace members including bots and deactivated accounts.
pub fn users_request() -> PageRequest {
    PageRequest::new("users.list", "members").label("all users")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_round_trips_unchanged() {
        let text = r#"{"deleted":false,"id":"U1","name":null,"team_id":"T1","profile":{"real_name":"Ada"}}"#;
        let user: User = serde_json::from_str(text).unwrap();
        assert_eq!(user.id(), Some("U1"));
        assert_eq!(serde_json::to_string(&user).unwrap(), text);
    }

    #[test]
    fn test_user_without_id_still_parses() {
        let user: User = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert_eq!(user.id(), None);
    }

    #[test]
    fn test_users_request() {
        let request = users_request();
        assert_eq!(request.method, "users.list");
        assert_eq!(request.field, "members");
        assert!(request.params.is_empty());
    }
}
