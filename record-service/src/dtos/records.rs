use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Data, Predicate, Record};

#[derive(Debug, Deserialize, Validate)]
pub struct SaveRecordRequest {
    #[validate(length(min = 1, max = 64, message = "Record type must be 1 to 64 characters"))]
    pub record_type: String,

    /// Existing record to patch. A new record is created when absent.
    pub id: Option<String>,

    #[serde(default)]
    pub data: Data,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QueryRecordsRequest {
    #[validate(length(min = 1, max = 64, message = "Record type must be 1 to 64 characters"))]
    pub record_type: String,

    /// Matches every record when absent.
    pub predicate: Option<Predicate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DiscoverRecordsRequest {
    #[validate(length(min = 1, max = 64, message = "Record type must be 1 to 64 characters"))]
    pub record_type: String,

    pub attributes: Data,
}

#[derive(Debug, Serialize)]
pub struct RecordsResponse {
    pub records: Vec<Record>,
}
