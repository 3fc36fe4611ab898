//! Core library for the service control plane: token lifecycle, credential store,
//! authorization predicates and the platform service backends.

pub mod auth;
mod error;
mod models;
pub mod services;

pub use error::{AuthError, Result, ServiceError};
pub use models::{ActionOutcome, LogEntry, ServiceAction, ServiceInfo, ServiceStatus};
pub use services::{ServiceBackend, DEFAULT_LOG_LINES, MAX_LOG_LINES};
