pub mod error;
mod loader;
mod options;
mod raw;

pub use error::ConfigError;
pub use loader::{load_options, load_options_from_env};
pub use options::{BatchOptions, Options, ProvisionMode};
