//! Kernel configuration
//!
//! Resource caps on principals, permission records, limits and handles are
//! policy, not constants: every cap is optional and `None` means unbounded.
//! A context can tighten the principal and permission caps further through
//! its own resource limits (see [`resources::names`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kernel-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Version of the configuration format
    pub version: u32,
    /// Cap on secondary principals per context
    #[serde(default)]
    pub max_secondary_principals: Option<usize>,
    /// Cap on permission records per context
    #[serde(default)]
    pub max_permission_entries: Option<usize>,
    /// Cap on distinct resource limit names per context
    #[serde(default)]
    pub max_resource_limits: Option<usize>,
    /// Cap on live handles per process
    #[serde(default)]
    pub max_handles_per_process: Option<usize>,
}

impl KernelConfig {
    /// Current version of the configuration format
    pub const CURRENT_VERSION: u32 = 1;

    /// Configuration with every cap unbounded
    pub fn unbounded() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            max_secondary_principals: None,
            max_permission_entries: None,
            max_resource_limits: None,
            max_handles_per_process: None,
        }
    }

    pub fn with_max_secondary_principals(mut self, cap: usize) -> Self {
        self.max_secondary_principals = Some(cap);
        self
    }

    pub fn with_max_permission_entries(mut self, cap: usize) -> Self {
        self.max_permission_entries = Some(cap);
        self
    }

    pub fn with_max_resource_limits(mut self, cap: usize) -> Self {
        self.max_resource_limits = Some(cap);
        self
    }

    pub fn with_max_handles_per_process(mut self, cap: usize) -> Self {
        self.max_handles_per_process = Some(cap);
        self
    }

    /// Loads a configuration from JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: KernelConfig = serde_json::from_slice(bytes)
            .map_err(|e| ConfigError::DeserializationFailed(e.to_string()))?;

        if config.version != Self::CURRENT_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }

        Ok(config)
    }

    /// Serializes the configuration to JSON bytes
    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        serde_json::to_vec_pretty(self).map_err(|e| ConfigError::SerializationFailed(e.to_string()))
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Configuration loading errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to serialize kernel config: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize kernel config: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported kernel config version: {0}")]
    UnsupportedVersion(u32),
}
