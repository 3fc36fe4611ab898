//! JWT 签发、校验与刷新

use super::models::{Claims, IssuedToken, TokenRecord};
use super::TokenManager;
use crate::error::AuthError;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

impl TokenManager {
    /// 签发新 token 并写入存储
    #[instrument(skip(self, roles))]
    pub fn issue(&self, user_id: &str, roles: &[String]) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.token_ttl)
            .ok_or_else(|| AuthError::Other("token expiry overflows the clock".to_string()))?;
        let token_id = Uuid::new_v4().to_string();

        let mut roles = roles.to_vec();
        roles.sort();
        roles.dedup();

        let claims = Claims {
            sub: user_id.to_string(),
            uid: user_id.to_string(),
            roles: roles.clone(),
            jti: token_id.clone(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::Other(format!("jwt encode failed: {}", e)))?;

        let record = TokenRecord {
            token_id,
            user_id: user_id.to_string(),
            roles,
            issued_at: now,
            expires_at,
        };
        self.store(record.clone());
        info!(token_id = %record.token_id, "token issued");

        Ok(IssuedToken { token, record })
    }

    /// 校验签名与时间字段，并与存储交叉校验（已撤销的 token 立即失效）
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => {
                debug!(error = %e, "token rejected");
                AuthError::Malformed
            }
        })?
        .claims;

        match self.read_tokens().get(&claims.jti) {
            None => {
                warn!(token_id = %claims.jti, "token not in store");
                Err(AuthError::Revoked)
            }
            Some(record) if !record.is_active_at(Utc::now()) => Err(AuthError::Expired),
            Some(_) => Ok(claims),
        }
    }

    /// 撤销当前 token 并为同一用户、同一角色签发新 token
    #[instrument(skip(self, claims), fields(user_id = %claims.uid))]
    pub fn refresh(&self, claims: &Claims) -> Result<IssuedToken, AuthError> {
        if !self.revoke(&claims.jti) {
            return Err(AuthError::Revoked);
        }
        self.issue(&claims.uid, &claims.roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> TokenManager {
        TokenManager::new("0123456789abcdef0123456789abcdef")
    }

    fn roles(list: &[&str]) -> Vec<String> {
        list.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn issue_fails_when_expiry_overflows() {
        let mut manager = manager();
        manager.token_ttl = Duration::MAX;
        assert!(matches!(
            manager.issue("admin", &roles(&["admin"])),
            Err(AuthError::Other(_))
        ));
        assert!(manager.list_for_user("admin").is_empty());
    }

    #[test]
    fn issued_token_validates_with_same_roles() {
        let manager = manager();
        let issued = manager.issue("admin", &roles(&["admin"])).unwrap();

        let claims = manager.validate(&issued.token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.uid, "admin");
        assert_eq!(claims.roles, vec!["admin".to_string()]);
        assert_eq!(claims.jti, issued.record.token_id);
        assert_eq!(claims.iss, "SysManix");
        assert!(issued.record.expires_at > issued.record.issued_at);
    }

    #[test]
    fn token_ids_are_unique() {
        let manager = manager();
        let a = manager.issue("u", &roles(&["viewer"])).unwrap();
        let b = manager.issue("u", &roles(&["viewer"])).unwrap();
        assert_ne!(a.record.token_id, b.record.token_id);
        assert_eq!(manager.list_for_user("u").len(), 2);
    }

    #[test]
    fn revoked_token_fails_validation() {
        let manager = manager();
        let issued = manager.issue("viewer", &roles(&["viewer"])).unwrap();
        assert!(manager.revoke(&issued.record.token_id));

        assert!(matches!(
            manager.validate(&issued.token),
            Err(AuthError::Revoked)
        ));
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let issued = manager().issue("admin", &roles(&["admin"])).unwrap();
        let other = TokenManager::new("another-secret-another-secret-xx");
        assert!(matches!(
            other.validate(&issued.token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            manager().validate("not.a.jwt"),
            Err(AuthError::Malformed)
        ));
        assert!(matches!(manager().validate(""), Err(AuthError::Malformed)));
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let issued = manager()
            .with_issuer("someone-else")
            .issue("admin", &roles(&["admin"]))
            .unwrap();
        assert!(manager().validate(&issued.token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let manager = manager();
        let now = Utc::now();
        let claims = Claims {
            sub: "admin".into(),
            uid: "admin".into(),
            roles: roles(&["admin"]),
            jti: "old".into(),
            iss: "SysManix".into(),
            iat: (now - Duration::hours(2)).timestamp(),
            nbf: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(manager.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn refresh_rotates_token() {
        let manager = manager();
        let first = manager.issue("viewer", &roles(&["viewer"])).unwrap();
        let claims = manager.validate(&first.token).unwrap();

        let second = manager.refresh(&claims).unwrap();
        assert_ne!(first.record.token_id, second.record.token_id);
        assert_eq!(second.record.roles, vec!["viewer".to_string()]);
        assert!(matches!(
            manager.validate(&first.token),
            Err(AuthError::Revoked)
        ));
        assert!(manager.validate(&second.token).is_ok());

        // 同一旧 token 不能重复刷新
        assert!(matches!(manager.refresh(&claims), Err(AuthError::Revoked)));
    }

    #[test]
    fn duplicate_roles_are_collapsed() {
        let manager = manager();
        let issued = manager
            .issue("ops", &roles(&["viewer", "admin", "viewer"]))
            .unwrap();
        assert_eq!(issued.record.roles, roles(&["admin", "viewer"]));
    }
}
