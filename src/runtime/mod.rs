//! The container: configuration, plugin lifecycle, and deployment.

mod config;
mod container;
mod plugin;

pub use config::RuntimeConfig;
pub use container::{DeployError, DeployedComponent, Runtime, RuntimeBuilder, RuntimeHandle};
pub use plugin::{Plugin, StartupError};
