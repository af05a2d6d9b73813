pub mod api_keys;
pub mod files;
pub mod health;
pub mod invitations;
pub mod organizations;
pub mod registers;
pub mod trust_access;
pub mod trust_portal;

pub use health::{health_check, metrics_endpoint, readiness_check};
