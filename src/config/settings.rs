//! Runtime settings: where the profile and payload live and how to sync
//!
//! Built once at startup from CLI flags, which clap backs with environment
//! variables; anything unset falls back to `constants`.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::persistent::WriteStrategy;
use crate::constants::paths::{CONFIG_FILE, PAYLOAD_FILE};
use crate::sync::TransformCommand;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub payload_path: PathBuf,
    pub transformer: TransformCommand,
    pub write_strategy: WriteStrategy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_FILE),
            payload_path: PathBuf::from(PAYLOAD_FILE),
            transformer: TransformCommand::default(),
            write_strategy: WriteStrategy::default(),
        }
    }
}

/// Optional overrides, as collected from the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub payload_path: Option<PathBuf>,
    pub transformer: Option<String>,
    pub transformer_args: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub in_place: bool,
}

impl Settings {
    /// Apply overrides on top of the defaults
    ///
    /// A custom transformer program starts with no leading arguments, since
    /// the default script argument only makes sense for the default program.
    pub fn resolve(overrides: Overrides) -> Self {
        let mut settings = Self::default();

        if let Some(path) = overrides.config_path {
            settings.config_path = path;
        }
        if let Some(path) = overrides.payload_path {
            settings.payload_path = path;
        }
        if let Some(program) = overrides.transformer {
            settings.transformer = TransformCommand::new(program);
        }
        if !overrides.transformer_args.is_empty() {
            settings.transformer.leading_args = overrides.transformer_args;
        }
        // Zero means wait forever
        settings.transformer.timeout = overrides
            .timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs);
        if overrides.in_place {
            settings.write_strategy = WriteStrategy::InPlace;
        }

        settings
    }
}
