//! 授权门：Bearer 头解析与角色判定（纯函数，无副作用）

use crate::error::AuthError;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VIEWER: &str = "viewer";

/// 解析 `Authorization` 头，必须恰好是 `Bearer <token>`
pub fn extract_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::Malformed)?;
    let mut parts = header.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::Malformed),
    }
}

/// 角色谓词：claims 中的角色与要求集合有交集即放行
#[derive(Debug, Clone, Copy)]
pub struct RoleGate {
    required: &'static [&'static str],
}

impl RoleGate {
    pub const ADMIN: RoleGate = RoleGate::any_of(&[ROLE_ADMIN]);
    pub const READ: RoleGate = RoleGate::any_of(&[ROLE_ADMIN, ROLE_VIEWER]);

    pub const fn any_of(required: &'static [&'static str]) -> Self {
        Self { required }
    }

    pub fn allows(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.required.contains(&r.as_str()))
    }

    pub fn required(&self) -> &'static [&'static str] {
        self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_shape() {
        assert_eq!(extract_bearer(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(extract_bearer(None).is_err());
        assert!(extract_bearer(Some("Bearer")).is_err());
        assert!(extract_bearer(Some("Bearer ")).is_err());
        assert!(extract_bearer(Some("bearer abc")).is_err());
        assert!(extract_bearer(Some("Basic abc")).is_err());
        assert!(extract_bearer(Some("Bearer a b")).is_err());
        assert!(extract_bearer(Some("abc")).is_err());
    }

    #[test]
    fn role_intersection() {
        let viewer = vec!["viewer".to_string()];
        let admin = vec!["admin".to_string()];
        let none: Vec<String> = vec![];

        assert!(RoleGate::READ.allows(&viewer));
        assert!(RoleGate::READ.allows(&admin));
        assert!(!RoleGate::ADMIN.allows(&viewer));
        assert!(RoleGate::ADMIN.allows(&admin));
        assert!(!RoleGate::READ.allows(&none));
        assert!(!RoleGate::ADMIN.allows(&["auditor".to_string()]));
    }
}
