pub mod auth;

pub use auth::{AuthContext, Principal, SessionClaims, SessionUser};
