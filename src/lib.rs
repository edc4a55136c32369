pub mod config;
pub mod error;
pub mod listings;
pub mod models;
pub mod run_log;
pub mod scrapers;
pub mod search;
pub mod session_pool;

pub use config::Config;
pub use error::{Result, ScoutError};
