//! Record - a stored row of a user-defined record type.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Data;

/// Columns managed by the service itself.
pub const ID_FIELD: &str = "_id";
pub const OWNER_ID_FIELD: &str = "_owner_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub record_type: String,
    pub owner_id: Option<String>,
    pub data: Data,
}

impl Record {
    pub fn new(record_type: impl Into<String>, owner_id: Option<String>, data: Data) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), record_type, owner_id, data)
    }

    pub fn with_id(
        id: impl Into<String>,
        record_type: impl Into<String>,
        owner_id: Option<String>,
        data: Data,
    ) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            owner_id,
            data,
        }
    }

    pub fn is_owned_by(&self, principal_id: Option<&str>) -> bool {
        matches!((self.owner_id.as_deref(), principal_id), (Some(owner), Some(id)) if owner == id)
    }

    /// Data plus the managed columns, as seen by predicates.
    pub fn row(&self) -> Data {
        let mut row = self.data.clone();
        row.insert(ID_FIELD.to_string(), self.id.clone().into());
        if let Some(owner) = &self.owner_id {
            row.insert(OWNER_ID_FIELD.to_string(), owner.clone().into());
        }
        row
    }
}

/// Record types share a namespace with internal collections: they must
/// start with a letter and contain only ASCII alphanumerics or `_`.
pub fn is_valid_record_type(record_type: &str) -> bool {
    let mut chars = record_type.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// First user-supplied key that collides with a managed column.
pub fn reserved_key(data: &Data) -> Option<&str> {
    data.keys().map(String::as_str).find(|k| k.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_names() {
        assert!(is_valid_record_type("note"));
        assert!(is_valid_record_type("note_v2"));
        assert!(!is_valid_record_type("_auth"));
        assert!(!is_valid_record_type(""));
        assert!(!is_valid_record_type("note.items"));
    }

    #[test]
    fn test_row_exposes_managed_columns() {
        let data = json!({"content": "hi"}).as_object().cloned().unwrap();
        let record = Record::with_id("r1", "note", Some("u1".to_string()), data);
        let row = record.row();

        assert_eq!(row["_id"], json!("r1"));
        assert_eq!(row["_owner_id"], json!("u1"));
        assert!(record.is_owned_by(Some("u1")));
        assert!(!record.is_owned_by(Some("u2")));
        assert!(!record.is_owned_by(None));
    }

    #[test]
    fn test_reserved_key_detection() {
        let data = json!({"title": "x", "_owner_id": "me"}).as_object().cloned().unwrap();
        assert_eq!(reserved_key(&data), Some("_owner_id"));
    }
}
