mod auth;
mod output;
mod services;
mod ui;

pub use auth::{
    admin_list_tokens, admin_revoke_user, hash_password, list_tokens, login, refresh_token,
    revoke_all_tokens, revoke_token,
};
pub use output::OutputFormat;
pub use services::{
    health, list_services, logs_service, start_service, status_service, stop_service,
};
