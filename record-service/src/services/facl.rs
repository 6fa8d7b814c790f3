//! Field access control registry.
//!
//! Rules combine most-permissive-wins: a capability is granted if any rule
//! matching one of the principal's roles (or `_owner` / `_public`) grants
//! it. A field without a matching rule is fully locked down. A record type
//! with no rules at all is treated as unconfigured: its owner gets every
//! capability and everyone else gets none.
//!
//! Master-key callers never reach this module; the bypass is made by the
//! record service before any lookup here.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::models::{Data, FieldAccess, FieldAccessError, FieldAccessRule, FieldUserRole};

/// Immutable, validated rule table.
#[derive(Debug, Default)]
pub struct FieldAccessTable {
    rules: Vec<FieldAccessRule>,
    // record_type -> record_field -> [(role, access)]
    index: HashMap<String, HashMap<String, Vec<(FieldUserRole, FieldAccess)>>>,
}

impl FieldAccessTable {
    /// Validate and index a complete rule set. Rejects the set as a whole.
    pub fn build(rules: Vec<FieldAccessRule>) -> Result<Self, FieldAccessError> {
        let mut seen = HashSet::new();
        let mut index: HashMap<String, HashMap<String, Vec<(FieldUserRole, FieldAccess)>>> =
            HashMap::new();

        for rule in &rules {
            if rule.record_type.is_empty() || rule.record_field.is_empty() {
                return Err(FieldAccessError::RuleTableReplaceFailed(
                    "record_type and record_field must not be empty".to_string(),
                ));
            }
            if let FieldUserRole::Role(role) = &rule.user_role {
                if role.is_empty() {
                    return Err(FieldAccessError::RuleTableReplaceFailed(format!(
                        "empty user_role for {}.{}",
                        rule.record_type, rule.record_field
                    )));
                }
            }
            let key = (
                rule.record_type.clone(),
                rule.record_field.clone(),
                rule.user_role.clone(),
            );
            if !seen.insert(key) {
                return Err(FieldAccessError::RuleTableReplaceFailed(format!(
                    "duplicate rule for {}.{} and role {}",
                    rule.record_type, rule.record_field, rule.user_role
                )));
            }

            index
                .entry(rule.record_type.clone())
                .or_default()
                .entry(rule.record_field.clone())
                .or_default()
                .push((rule.user_role.clone(), rule.access()));
        }

        Ok(Self { rules, index })
    }

    pub fn rules(&self) -> &[FieldAccessRule] {
        &self.rules
    }

    pub fn is_configured(&self, record_type: &str) -> bool {
        self.index.contains_key(record_type)
    }

    pub fn resolve<S: AsRef<str>>(
        &self,
        record_type: &str,
        field: &str,
        roles: &[S],
        is_owner: bool,
    ) -> FieldAccess {
        let Some(fields) = self.index.get(record_type) else {
            return if is_owner {
                FieldAccess::ALL
            } else {
                FieldAccess::NONE
            };
        };

        fields
            .get(field)
            .into_iter()
            .flatten()
            .filter(|(role, _)| role.matches(roles, is_owner))
            .fold(FieldAccess::NONE, |acc, (_, access)| acc.union(*access))
    }

    pub fn filter_readable_fields<S: AsRef<str>>(
        &self,
        record_type: &str,
        data: &Data,
        roles: &[S],
        is_owner: bool,
    ) -> Data {
        data.iter()
            .filter(|(field, _)| self.resolve(record_type, field, roles, is_owner).readable)
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    pub fn reject_unwritable_fields<S: AsRef<str>>(
        &self,
        record_type: &str,
        patch: &Data,
        roles: &[S],
        is_owner: bool,
    ) -> Result<(), FieldAccessError> {
        match patch
            .keys()
            .find(|field| !self.resolve(record_type, field, roles, is_owner).writable)
        {
            Some(field) => Err(FieldAccessError::ForbiddenFieldWrite {
                record_type: record_type.to_string(),
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Every field referenced by a query predicate must be comparable.
    pub fn validate_query_fields<F, S>(
        &self,
        record_type: &str,
        fields: F,
        roles: &[S],
        is_owner: bool,
    ) -> Result<(), FieldAccessError>
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        S: AsRef<str>,
    {
        self.check_fields(record_type, fields, |field| {
            self.resolve(record_type, field, roles, is_owner).comparable
        })
    }

    /// Every field used to look a record up by value must be discoverable.
    pub fn validate_discoverable_fields<F, S>(
        &self,
        record_type: &str,
        fields: F,
        roles: &[S],
        is_owner: bool,
    ) -> Result<(), FieldAccessError>
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
        S: AsRef<str>,
    {
        self.check_fields(record_type, fields, |field| {
            self.resolve(record_type, field, roles, is_owner).discoverable
        })
    }

    fn check_fields<F>(
        &self,
        record_type: &str,
        fields: F,
        allowed: impl Fn(&str) -> bool,
    ) -> Result<(), FieldAccessError>
    where
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        for field in fields {
            let field = field.as_ref();
            if !allowed(field) {
                return Err(FieldAccessError::ForbiddenFieldQuery {
                    record_type: record_type.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Shared, swappable field access table.
///
/// Readers take an `Arc` snapshot and work on it without holding the lock,
/// so a concurrent replace is seen either entirely or not at all.
#[derive(Debug, Default)]
pub struct FieldAccessRegistry {
    table: RwLock<Arc<FieldAccessTable>>,
}

impl FieldAccessRegistry {
    pub fn new(table: FieldAccessTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> Arc<FieldAccessTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            // Only an Arc assignment happens under the write lock.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in an already validated table.
    pub fn install(&self, table: FieldAccessTable) {
        let table = Arc::new(table);
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Validate `rules` as a whole and swap them in. On error the current
    /// table stays in place untouched.
    pub fn replace_all(&self, rules: Vec<FieldAccessRule>) -> Result<(), FieldAccessError> {
        let table = FieldAccessTable::build(rules)?;
        self.install(table);
        Ok(())
    }

    pub fn rules(&self) -> Vec<FieldAccessRule> {
        self.snapshot().rules().to_vec()
    }

    pub fn resolve<S: AsRef<str>>(
        &self,
        record_type: &str,
        field: &str,
        roles: &[S],
        is_owner: bool,
    ) -> FieldAccess {
        self.snapshot().resolve(record_type, field, roles, is_owner)
    }
}
