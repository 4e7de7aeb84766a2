//! Program identity: content digests of kernel source and build defines.
//!
//! Two digests fully determine whether a recompile is needed. Any stable
//! content digest works here; SHA-256 keeps the comparison collision-safe
//! without depending on how the source text was assembled.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest of a byte string.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Digest arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Short hex prefix for logs.
    pub fn short_hex(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short_hex())
    }
}

/// Identity of a successfully built kernel program.
///
/// The engine stores the identity of the last successful build; a subsequent
/// build request with an equal identity (and caching enabled) skips
/// recompilation entirely.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProgramIdentity {
    pub source: ContentDigest,
    pub defines: ContentDigest,
}

impl ProgramIdentity {
    pub fn new(source_text: &[u8], defines: &str) -> Self {
        Self {
            source: ContentDigest::of(source_text),
            defines: ContentDigest::of(defines.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_equal_identities() {
        let a = ProgramIdentity::new(b"__kernel void k() {}", "-DFOO=1");
        let b = ProgramIdentity::new(b"__kernel void k() {}", "-DFOO=1");
        assert_eq!(a, b);
    }

    #[test]
    fn changing_source_changes_identity() {
        let a = ProgramIdentity::new(b"__kernel void k() {}", "-DFOO=1");
        let b = ProgramIdentity::new(b"__kernel void k() { ; }", "-DFOO=1");
        assert_ne!(a, b);
        assert_eq!(a.defines, b.defines);
    }

    #[test]
    fn changing_defines_changes_identity() {
        let a = ProgramIdentity::new(b"__kernel void k() {}", "-DFOO=1");
        let b = ProgramIdentity::new(b"__kernel void k() {}", "-DFOO=2");
        assert_ne!(a, b);
        assert_eq!(a.source, b.source);
    }

    #[test]
    fn short_hex_is_eight_bytes_of_hex() {
        let d = ContentDigest::of(b"abc");
        assert_eq!(d.short_hex().len(), 16);
        assert!(d.short_hex().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
