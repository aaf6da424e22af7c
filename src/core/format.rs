//! Purpose: Centralize cache record layout constants and payload versioning.
//! Exports: `CACHE_MAGIC`, `CACHE_HEADER_LEN`, `CACHE_PAYLOAD_VERSION`,
//! `SUPPORTED_CACHE_PAYLOAD_VERSIONS`, `MAX_CACHE_PAYLOAD_LEN`, `MAX_CACHE_VALUE_DEPTH`,
//! `payload_version_error`.
//! Role: Shared policy for gating on-disk compatibility across write/read/inspect paths.
//! Invariants: Version list is additive; bump only for incompatible payload changes.
//! Invariants: The header layout never changes; only the payload carries a version.

use crate::core::error::{Error, ErrorKind};

pub const CACHE_MAGIC: [u8; 8] = *b"SLITCACH";
/// Magic (8) + source mtime seconds (8) + source size (8).
pub const CACHE_HEADER_LEN: usize = 24;

pub const CACHE_PAYLOAD_VERSION: u32 = 1;
pub const SUPPORTED_CACHE_PAYLOAD_VERSIONS: &[u32] = &[CACHE_PAYLOAD_VERSION];

/// Upper bound on a decoded payload; larger records are treated as corrupt.
pub const MAX_CACHE_PAYLOAD_LEN: u64 = 256 * 1024 * 1024;

/// Deepest value a record may hold; deeper values are not cached.
pub const MAX_CACHE_VALUE_DEPTH: usize = 256;

pub fn is_supported_payload_version(version: u32) -> bool {
    SUPPORTED_CACHE_PAYLOAD_VERSIONS.contains(&version)
}

pub fn payload_version_error(detected: u32) -> Error {
    let supported = SUPPORTED_CACHE_PAYLOAD_VERSIONS
        .iter()
        .map(|version| version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::new(ErrorKind::CacheMismatch)
        .with_message(format!(
            "unsupported payload version {detected} (supported: {supported})"
        ))
        .with_hint("Rebuild the cache with `safelit cache write <path>`.")
}
