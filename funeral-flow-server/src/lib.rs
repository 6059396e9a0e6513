pub mod config;
pub mod models;
pub mod profiles;
pub mod service;

pub use config::ServiceConfig;
pub use profiles::{ProfileBackend, Profiles};
pub use service::{AppState, build_router, create_app};
