//! Security context encoding
//!
//! A context is encoded as compact JSON of a [`ContextSnapshot`]. Every
//! collection in the snapshot is sorted, so encoding the same unmodified
//! context twice yields byte-identical buffers.
//!
//! Callers use the size-then-fill convention: an undersized buffer yields
//! [`KernelError::BufferTooSmall`] carrying the exact required size.

use core_types::Principal;
use kernel_api::KernelError;
use policy::PermissionRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Format tag written into every snapshot
pub const SNAPSHOT_FORMAT: &str = "security-context";

/// Self-describing image of one security context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub format: String,
    pub version: u32,
    pub primary: Option<Principal>,
    pub secondary: Vec<Principal>,
    pub permissions: Vec<PermissionRecord>,
    pub limits: BTreeMap<String, u64>,
}

impl ContextSnapshot {
    /// Current version of the snapshot format
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        primary: Option<Principal>,
        secondary: Vec<Principal>,
        permissions: Vec<PermissionRecord>,
        limits: BTreeMap<String, u64>,
    ) -> Self {
        Self {
            format: SNAPSHOT_FORMAT.to_string(),
            version: Self::CURRENT_VERSION,
            primary,
            secondary,
            permissions,
            limits,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        serde_json::to_vec(self).map_err(|e| EncodingError::SerializationFailed(e.to_string()))
    }

    /// Parses an encoded buffer, checking the format tag and version
    pub fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        let snapshot: ContextSnapshot = serde_json::from_slice(bytes)
            .map_err(|e| EncodingError::DeserializationFailed(e.to_string()))?;

        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(EncodingError::UnknownFormat(snapshot.format));
        }
        if snapshot.version != Self::CURRENT_VERSION {
            return Err(EncodingError::UnsupportedVersion(snapshot.version));
        }

        Ok(snapshot)
    }
}

/// Copies an encoded image into a caller buffer
pub fn fill_buffer(encoded: &[u8], buffer: &mut [u8]) -> Result<usize, KernelError> {
    let required = encoded.len();
    if buffer.len() < required {
        return Err(KernelError::BufferTooSmall { required });
    }
    buffer[..required].copy_from_slice(encoded);
    Ok(required)
}

/// Snapshot encoding errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Failed to serialize security context: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize security context: {0}")]
    DeserializationFailed(String),

    #[error("Unknown snapshot format: {0}")]
    UnknownFormat(String),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

impl From<EncodingError> for KernelError {
    fn from(err: EncodingError) -> Self {
        KernelError::InvalidArgument(err.to_string())
    }
}
