//! Utilities: logging setup, host environment, file diagnostics and asset staging

mod files;
mod logging;
mod memory;
mod staging;

pub use files::FileDiagnostics;
pub use logging::{setup_logging, LogConfig};
pub use memory::{HostEnvironment, SystemEnvironment};
pub use staging::AssetStager;

#[cfg(test)]
pub(crate) use memory::fake;
