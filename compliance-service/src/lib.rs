pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod pdf;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
