//! Configuration loading and validation.
//!
//! Config files: `ribbon.toml`, `ribbon.yaml`, or `ribbon.json`
//! Searched in `./` then `~/.config/ribbon/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        config_dir, data_dir, discover_and_load, find_or_default_config_path,
        load_config, save_config, set_data_dir,
    },
    schema::{
        BindingsConfig, CacheConfig, EngineConfig, ExtensionsConfig, HostConfig, RibbonConfig,
        SessionConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
