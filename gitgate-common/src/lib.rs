mod config;
mod error;
mod types;

pub use config::*;
pub use error::GitgateError;
pub use types::*;
