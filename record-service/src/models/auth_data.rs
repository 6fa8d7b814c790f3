//! Identity attributes submitted at signup/login, e.g.
//! `{"username": "userA", "email": "userA@abc.com"}`, together with the
//! configured key groups that may identify a user.

use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;

use super::{Data, Expression, Predicate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("auth data does not satisfy any configured key group")]
pub struct NoSatisfiedIdentityGroup;

#[derive(Debug, Clone, PartialEq)]
pub struct AuthData {
    data: Data,
    keys: Vec<Vec<String>>,
}

impl AuthData {
    /// `record_keys` is in priority order: when several groups are
    /// satisfied, the earliest one is used.
    pub fn new(data: Data, record_keys: Vec<Vec<String>>) -> Self {
        Self {
            data,
            keys: record_keys,
        }
    }

    pub fn all_keys(&self) -> BTreeSet<String> {
        self.keys.iter().flatten().cloned().collect()
    }

    /// First key group whose fields are all present and non-null, or an
    /// empty list when none is. Empty groups never count as satisfied.
    pub fn using_keys(&self) -> Vec<String> {
        self.keys
            .iter()
            .find(|group| !group.is_empty() && group.iter().all(|k| !self.is_field_empty(k)))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_data(&self) -> Data {
        self.data.clone()
    }

    /// `And` of `key == value` over the satisfied group.
    pub fn make_equal_predicate(&self) -> Result<Predicate, NoSatisfiedIdentityGroup> {
        let using = self.using_keys();
        if using.is_empty() {
            return Err(NoSatisfiedIdentityGroup);
        }

        let terms = using
            .iter()
            .filter_map(|key| {
                self.data
                    .get(key)
                    .filter(|v| !v.is_null())
                    .map(|v| Predicate::equal(Expression::key_path(key), Expression::Literal(v.clone())))
            })
            .collect();

        Ok(Predicate::and(terms))
    }

    /// Refresh every key-group field from a stored record. Fields the record
    /// lacks become absent.
    pub fn update_from_record_data(&mut self, record: &Data) {
        for key in self.all_keys() {
            match record.get(&key) {
                Some(value) => {
                    self.data.insert(key, value.clone());
                }
                None => {
                    self.data.remove(&key);
                }
            }
        }
    }

    /// No stray attributes and at least one satisfied group.
    pub fn is_valid(&self) -> bool {
        let all_keys = self.all_keys();
        self.data.keys().all(|k| all_keys.contains(k)) && !self.using_keys().is_empty()
    }

    /// True when there is no data or every value is null.
    pub fn is_empty(&self) -> bool {
        self.data.values().all(Value::is_null)
    }

    fn is_field_empty(&self, key: &str) -> bool {
        self.data.get(key).map_or(true, Value::is_null)
    }
}
