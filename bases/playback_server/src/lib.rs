mod config;
mod error;
mod server;

pub use config::{CliArgs, Config};
pub use error::ServerError;
pub use server::Listener;
