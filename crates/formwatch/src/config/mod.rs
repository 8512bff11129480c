mod loader;

pub use loader::{CONFIG_ENV, ConfigError, ConfigLoader};
