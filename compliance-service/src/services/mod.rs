pub mod database;
pub mod domains;
pub mod email;
pub mod metrics;
pub mod storage;
pub mod tokens;
pub mod trust_access;
pub mod trust_portal;

pub use database::Database;
pub use domains::{build_domain_provider, DomainProvider};
pub use email::{build_provider, EmailProvider, Mailer};
pub use metrics::{get_metrics, init_metrics};
pub use storage::{LocalStorage, S3Storage, Storage};
pub use trust_access::{ClientInfo, TrustAccessService};
pub use trust_portal::TrustPortalService;
