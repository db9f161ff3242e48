//! Extraction limits: ZIP bomb protection, path traversal guards, size caps.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Largest uncompressed/compressed ratio accepted for a single entry.
    pub max_compression_ratio: u64,
    /// Largest number of entries an archive may hold.
    pub max_entry_count: u64,
    /// Largest uncompressed size of a single entry, in bytes.
    pub max_entry_size_bytes: u64,
    /// Largest uncompressed size of the whole archive, in bytes.
    pub max_total_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_entry_count: 10_000,
            max_entry_size_bytes: 200 * MIB,
            max_total_size_bytes: 1024 * MIB,
        }
    }
}

/// Reject entry names that would land outside the extraction root.
pub fn check_path_traversal(entry_name: &str) -> Result<(), SecurityError> {
    let traversal = || SecurityError::PathTraversal {
        path: entry_name.to_string(),
    };

    if entry_name.starts_with('/') || entry_name.starts_with('\\') {
        return Err(traversal());
    }

    // Drive-letter prefixes such as `C:\`
    if entry_name.len() >= 2 && entry_name.as_bytes()[1] == b':' {
        return Err(traversal());
    }

    let escapes = entry_name
        .split(['/', '\\'])
        .any(|segment| segment == "..")
        || Path::new(entry_name)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(traversal());
    }

    Ok(())
}

pub fn check_compression_ratio(
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if compressed_size == 0 {
        if uncompressed_size > 0 {
            return Err(SecurityError::ZipBomb {
                ratio: u64::MAX,
                limit: limits.max_compression_ratio,
            });
        }
        return Ok(());
    }

    let ratio = uncompressed_size / compressed_size;
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            ratio,
            limit: limits.max_compression_ratio,
        });
    }

    Ok(())
}

pub fn check_entry_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_entry_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_entry_count,
        });
    }
    Ok(())
}

pub fn check_entry_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_entry_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size_bytes / MIB,
            limit_mb: limits.max_entry_size_bytes / MIB,
        });
    }
    Ok(())
}

pub fn check_total_size(total_bytes: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if total_bytes > limits.max_total_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: "<total>".to_string(),
            size_mb: total_bytes / MIB,
            limit_mb: limits.max_total_size_bytes / MIB,
        });
    }
    Ok(())
}

/// Run every per-entry check against the sizes declared in the entry header.
pub fn check_entry(
    name: &str,
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    check_path_traversal(name)?;
    check_entry_size(name, uncompressed_size, limits)?;
    check_compression_ratio(compressed_size, uncompressed_size, limits)
}
