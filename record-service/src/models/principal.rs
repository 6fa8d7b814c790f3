//! Who is calling: the authenticated principal (if any) and whether the
//! request carried the master key.

/// Implicit role every principal holds for field access rules, e.g.
/// `_user_id:johndoe`.
pub const USER_ID_ROLE_PREFIX: &str = "_user_id:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Roles matched against field access rules: the assigned roles plus
    /// the principal's own `_user_id:<id>` role.
    pub fn acl_roles(&self) -> Vec<String> {
        let mut roles = self.roles.clone();
        roles.push(format!("{}{}", USER_ID_ROLE_PREFIX, self.id));
        roles
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub principal: Option<Principal>,
    pub master_key: bool,
}

impl AuthContext {
    pub fn unauthenticated() -> Self {
        Self::default()
    }

    pub fn master() -> Self {
        Self {
            principal: None,
            master_key: true,
        }
    }

    pub fn for_principal(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            master_key: false,
        }
    }

    pub fn with_master_key(mut self, master_key: bool) -> Self {
        self.master_key = master_key;
        self
    }

    pub fn principal_id(&self) -> Option<&str> {
        self.principal.as_ref().map(|p| p.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_roles_include_user_id_role() {
        let principal = Principal::new("johndoe", vec!["writer".to_string()]);
        assert_eq!(principal.acl_roles(), vec!["writer", "_user_id:johndoe"]);
        assert!(!principal.has_role("_user_id:johndoe"));
    }
}
