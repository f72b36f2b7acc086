//! cidlock-crypto: convergent envelope encryption for cidlock
//!
//! Architecture: two-layer AES-256-GCM (128-bit IV) over content-addressed blobs
//!
//! Upload pipeline: signature → UserKey, plaintext → CID → ContentKey → encrypt → CID of ciphertext
//!
//! Key hierarchy:
//! ```text
//! Wallet signature (session secret)
//!   └── UserKey = SHA-256(signature)
//!       ├── metadata AEAD: AES-256-GCM (key=UserKey, iv=random 128-bit)
//!       └── wrapped identifier: AES-256-GCM(UserKey, same iv, cidStr)
//!
//! Plaintext bytes
//!   └── cidStr = CIDv1(raw, sha2-256)
//!       └── ContentKey = SHA-256(cidStr)
//!           └── blob AEAD: AES-256-GCM (key=ContentKey, iv=all-zero)
//! ```
//!
//! The zero IV on the content layer is sound only because every distinct
//! plaintext yields a distinct ContentKey. Identical plaintexts yield an
//! identical blob, which lets the backend deduplicate without ever learning
//! the plaintext CID.

pub mod cipher;
pub mod content_id;
pub mod decrypt;
pub mod encrypt;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod session;

pub use content_id::{compute_cid, ContentId};
pub use decrypt::{decrypt, publish_record, unwrap_content_id};
pub use encrypt::encrypt;
pub use envelope::{EncryptedEnvelope, EnvelopeRecord, FileMetadata, PlaintextFile, RetrievalMode};
pub use error::{CryptoError, CryptoResult};
pub use keys::{derive_content_key, derive_user_key, ContentKey, UserKey};
pub use session::{Session, SessionLease, SignatureProvider};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM initialization vector (128-bit)
pub const IV_SIZE: usize = 16;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Fixed IV for the content-keyed layer
pub const CONTENT_IV: [u8; IV_SIZE] = [0u8; IV_SIZE];
