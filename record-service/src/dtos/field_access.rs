use serde::{Deserialize, Serialize};

use crate::models::FieldAccessRule;

/// Complete field access table, both as returned and as submitted for
/// replacement.
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldAccessPayload {
    pub access: Vec<FieldAccessRule>,
}
