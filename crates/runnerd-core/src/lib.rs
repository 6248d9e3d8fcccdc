//! Shared foundation for Runnerd: configuration loading and the error
//! type every crate in the workspace returns.

pub mod config;
pub mod error;

pub use config::RunnerdConfig;
pub use error::{Error, Result};
