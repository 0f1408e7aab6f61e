use thiserror::Error;

use crate::registers::RegisterFile;

/// Smallest accepted register file.
pub const MIN_REGISTER_COUNT: usize = 16;

/// Runtime configuration shared by the library and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    /// Words in register files created by [`VmConfig::register_file`].
    pub register_count: usize,
    /// Bundles larger than this are rejected before decoding.
    pub max_bundle_bytes: usize,
    /// Pre-bind externs named `trace` to a logging callback.
    pub bind_trace_extern: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            register_count: RegisterFile::DEFAULT_LEN,
            max_bundle_bytes: 64 * 1024 * 1024,
            bind_trace_extern: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}

impl VmConfig {
    /// Defaults overridden by `FXVM_REGISTER_COUNT`, `FXVM_MAX_BUNDLE_BYTES` and
    /// `FXVM_BIND_TRACE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`VmConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("FXVM_REGISTER_COUNT") {
            config.register_count = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| n >= MIN_REGISTER_COUNT)
                .ok_or(ConfigError::InvalidEnv("FXVM_REGISTER_COUNT"))?;
        }
        if let Some(raw) = lookup("FXVM_MAX_BUNDLE_BYTES") {
            config.max_bundle_bytes = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnv("FXVM_MAX_BUNDLE_BYTES"))?;
        }
        if let Some(raw) = lookup("FXVM_BIND_TRACE") {
            config.bind_trace_extern = match raw.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(ConfigError::InvalidEnv("FXVM_BIND_TRACE")),
            };
        }
        Ok(config)
    }

    /// A zeroed register file of `register_count` words.
    pub fn register_file(&self) -> RegisterFile {
        RegisterFile::new(self.register_count.max(MIN_REGISTER_COUNT))
    }
}
