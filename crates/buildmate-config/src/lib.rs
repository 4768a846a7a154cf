//! Configuration layer for build-mate.
//!
//! Raw, user-facing option shapes ([`Options`]), config file discovery
//! ([`ConfigDiscovery`]), and the two project files the build reads for
//! metadata: `package.json` ([`PackageJson`]) and `tsconfig.json` ([`TsConfig`]).

pub mod discovery;
pub mod error;
pub mod jsonc;
pub mod options;
pub mod package;
pub mod tsconfig;

pub use discovery::{ConfigDiscovery, LoadedConfig, CONFIG_FILES, PACKAGE_KEY};
pub use error::{ConfigError, Result};
pub use options::*;
pub use package::PackageJson;
pub use tsconfig::{CompilerOptions, TsConfig};
