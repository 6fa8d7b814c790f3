pub mod auth;
pub mod field_access;
pub mod records;
