mod auth;
pub use auth::*;
mod pipe;
pub use pipe::*;
mod services;
pub use services::*;
