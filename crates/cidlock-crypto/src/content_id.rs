//! Content addressing: CIDv1 over raw bytes with a sha2-256 multihash
//!
//! Rendered as multibase base32-lower text (`bafkrei…`), the same form IPFS
//! gateways accept, so the string doubles as a storage key and as KDF input.

use std::fmt;
use std::str::FromStr;

use ::cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Multicodec code for raw binary content
const RAW_CODEC: u64 = 0x55;

/// Multihash code for sha2-256
const SHA2_256: u64 = 0x12;

/// A content identifier string derived from a buffer's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Validate an identifier read back from storage or an envelope.
    ///
    /// Only CIDv1 / raw / sha2-256 identifiers are accepted, since those are
    /// the only ones `compute_cid` produces.
    pub fn parse(s: &str) -> Result<Self, CryptoError> {
        let cid = Cid::try_from(s)
            .map_err(|e| CryptoError::malformed(format!("invalid content identifier: {e}")))?;
        if cid.codec() != RAW_CODEC || cid.hash().code() != SHA2_256 {
            return Err(CryptoError::malformed(format!(
                "unexpected content identifier type: codec={:#x} hash={:#x}",
                cid.codec(),
                cid.hash().code()
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute the CID of a byte buffer.
pub fn compute_cid(bytes: &[u8]) -> ContentId {
    let mh = Code::Sha2_256.digest(bytes);
    ContentId(Cid::new_v1(RAW_CODEC, mh).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_deterministic() {
        assert_eq!(compute_cid(b"hello"), compute_cid(b"hello"));
    }

    #[test]
    fn test_cid_differs_by_content() {
        assert_ne!(compute_cid(b"hello"), compute_cid(b"hellp"));
    }

    #[test]
    fn test_cid_format() {
        let cid = compute_cid(b"hello");
        // CIDv1 raw sha2-256 in base32 always starts with "bafkrei"
        assert!(cid.as_str().starts_with("bafkrei"), "got {cid}");
    }

    #[test]
    fn test_cid_empty_input() {
        let cid = compute_cid(b"");
        assert!(ContentId::parse(cid.as_str()).is_ok());
    }

    #[test]
    fn test_parse_roundtrips_computed() {
        let cid = compute_cid(b"some file bytes");
        let parsed: ContentId = cid.as_str().parse().unwrap();
        assert_eq!(parsed, cid);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = ContentId::parse("not-a-cid");
        assert!(matches!(result, Err(CryptoError::MalformedEnvelope(_))));
    }
}
