//! Token 生命周期管理、凭据存储与授权判定

mod credentials;
mod crypto;
mod gate;
mod jwt;
mod manager;
mod models;

pub use credentials::{Credential, CredentialStore};
pub use crypto::{hash_password, hash_password_blocking, verify_password, HASH_PREFIX};
pub use gate::{extract_bearer, RoleGate, ROLE_ADMIN, ROLE_VIEWER};
pub use manager::{TokenManager, MAX_TOKEN_TTL};
pub use models::{
    AdminRevokeRequest, Claims, IssuedToken, LoginRequest, LoginResponse, RevokeTokenRequest,
    TokenRecord,
};
