//! Item change events and their wire encoding.
//!
//! Every successful mutation on the HTTP surface produces one [`ItemEvent`].
//! The event is serialized once and the resulting text is what the
//! broadcaster fans out:
//!
//! ```text
//! {"action":"created","key":"x","value":"1"}
//! {"action":"deleted","key":"x"}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to an item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    /// Item written through `POST /items`.
    Created,
    /// Existing item overwritten through `PUT /items/{key}`.
    Updated,
    /// Item removed through `DELETE /items/{key}`.
    Deleted,
}

impl ItemAction {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification for one item.
///
/// `value` is present for `created` / `updated` and absent for `deleted`;
/// the constructors are the only way to build one, so that pairing always
/// holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEvent {
    action: ItemAction,
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

impl ItemEvent {
    /// An item was created (or upserted through the create endpoint).
    pub fn created(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: ItemAction::Created,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// An existing item received a new value.
    pub fn updated(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            action: ItemAction::Updated,
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// An item was deleted.
    pub fn deleted(key: impl Into<String>) -> Self {
        Self {
            action: ItemAction::Deleted,
            key: key.into(),
            value: None,
        }
    }

    /// The action.
    pub fn action(&self) -> ItemAction {
        self.action
    }

    /// The affected key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize to the JSON text sent over the websocket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_wire_format() {
        let event = ItemEvent::created("x", "1");
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"action":"created","key":"x","value":"1"}"#
        );
    }

    #[test]
    fn updated_wire_format() {
        let event = ItemEvent::updated("color", "blue");
        assert_eq!(
            event.to_json().unwrap(),
            r#"{"action":"updated","key":"color","value":"blue"}"#
        );
    }

    #[test]
    fn deleted_omits_value() {
        let event = ItemEvent::deleted("x");
        let json = event.to_json().unwrap();
        assert_eq!(json, r#"{"action":"deleted","key":"x"}"#);
        assert!(!json.contains("value"));
    }

    #[test]
    fn accessors() {
        let event = ItemEvent::updated("k", "v");
        assert_eq!(event.action(), ItemAction::Updated);
        assert_eq!(event.key(), "k");
        assert_eq!(ItemEvent::deleted("k").action(), ItemAction::Deleted);
    }

    #[test]
    fn empty_value_is_still_serialized() {
        let json = ItemEvent::created("k", "").to_json().unwrap();
        assert_eq!(json, r#"{"action":"created","key":"k","value":""}"#);
    }

    #[test]
    fn parses_client_side_shape() {
        let event: ItemEvent =
            serde_json::from_str(r#"{"action":"deleted","key":"gone"}"#).unwrap();
        assert_eq!(event, ItemEvent::deleted("gone"));
    }

    #[test]
    fn unknown_action_rejected() {
        let result = serde_json::from_str::<ItemEvent>(r#"{"action":"renamed","key":"k"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn action_display_matches_wire_name() {
        for action in [ItemAction::Created, ItemAction::Updated, ItemAction::Deleted] {
            let wire = serde_json::to_value(action).unwrap();
            assert_eq!(wire, action.to_string());
        }
    }

    #[test]
    fn non_ascii_keys_round_trip_as_utf8() {
        let json = ItemEvent::created("clé", "värde").to_json().unwrap();
        assert!(json.contains("clé"));
        assert!(json.contains("värde"));
    }
}
