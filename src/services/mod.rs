//! Business logic services layer

pub mod audit_service;
pub mod login_service;
pub mod token_service;
pub mod user_service;

pub use audit_service::{AuditAction, AuditService};
pub use login_service::{LoginPolicy, LoginService};
pub use token_service::TokenService;
pub use user_service::UserService;
