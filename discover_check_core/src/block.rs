//! Content identifiers and the block headers exchanged by collectors
//!
//! Identifiers are [`cid::Cid`]s. This module adds the multicodec and
//! multihash codes the validator deals in and the catalog key derivation.

use crate::{Error, Result, error::InternalError};
use cid::multihash::Multihash;
use serde::{Serialize, Serializer};

pub use cid::Cid;

/// Multicodec: raw binary
pub const CODEC_RAW: u64 = 0x55;
/// Multicodec: DAG-PB
pub const CODEC_DAG_PB: u64 = 0x70;
/// Multicodec: DAG-CBOR
pub const CODEC_DAG_CBOR: u64 = 0x71;
/// Multicodec: unsealed Filecoin piece commitment
pub const CODEC_FIL_COMMITMENT_UNSEALED: u64 = 0xf101;

/// Multihash: identity
pub const MH_IDENTITY: u64 = 0x00;
/// Multihash: SHA2-256
pub const MH_SHA2_256: u64 = 0x12;
/// Multihash: SHA2-256 with the two top bits cleared, over Fr32 padded input
pub const MH_SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

/// Build a CIDv1 naming `digest`
pub fn cid_v1(codec: u64, hash_code: u64, digest: &[u8]) -> Result<Cid> {
    let hash = Multihash::wrap(hash_code, digest).map_err(|e| {
        Error::Internal(InternalError::assertion(format!(
            "{}-byte digest does not fit a multihash: {e}",
            digest.len()
        )))
    })?;
    Ok(Cid::new_v1(codec, hash))
}

/// The low 16 bytes of the binary form, used as catalog key
pub fn catalog_key(cid: &Cid) -> Option<[u8; 16]> {
    let bytes = cid.to_bytes();
    let low = bytes.get(bytes.len().checked_sub(16)?..)?;
    low.try_into().ok()
}

/// Serde adapter writing identifiers in their multibase string form
pub mod as_string {
    use super::*;

    pub fn serialize_option<S: Serializer>(
        cid: &Option<Cid>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match cid {
            Some(cid) => serializer.collect_str(cid),
            None => serializer.serialize_none(),
        }
    }

    pub fn serialize_all<S: Serializer>(
        cids: &[Cid],
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(cids.iter().map(Cid::to_string))
    }
}

/// The unit a collector produces and the only type crossing collector boundaries
///
/// `content_id` is `None` for placeholders: leaves whose digest is still being
/// computed by an async hasher, or that have no standalone identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockHeader {
    #[serde(serialize_with = "as_string::serialize_option")]
    pub content_id: Option<Cid>,
    pub size_raw: u64,
    pub size_stored: u64,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "as_string::serialize_all"
    )]
    pub links: Vec<Cid>,
}

impl BlockHeader {
    pub fn new(content_id: Option<Cid>, size_raw: u64, size_stored: u64) -> Self {
        Self {
            content_id,
            size_raw,
            size_stored,
            links: Vec::new(),
        }
    }

    pub fn placeholder(size_raw: u64) -> Self {
        Self::new(None, size_raw, size_raw)
    }

    pub fn is_placeholder(&self) -> bool {
        self.content_id.is_none()
    }

    /// Digest of the identified content, empty for placeholders
    pub fn digest(&self) -> &[u8] {
        match &self.content_id {
            Some(cid) => cid.hash().digest(),
            None => &[],
        }
    }
}
