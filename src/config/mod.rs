//! Engine configuration
//!
//! Three layers, later layers win:
//! 1. Built-in defaults
//! 2. Config file (`--config vci.toml`)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::EngineDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use merge::{deep_merge, merge_layers, merge_objects};
pub use settings::EngineSettings;
