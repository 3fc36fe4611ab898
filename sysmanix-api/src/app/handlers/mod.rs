mod admin;
mod auth;
mod health;
mod services;

pub use admin::{list_all_tokens, list_user_tokens, revoke_user_tokens};
pub use auth::{list_tokens, login, refresh_token, revoke_all_tokens, revoke_token};
pub use health::{handler_404, health};
pub use services::{get_logs, get_status, list_services, start_service, stop_service};
