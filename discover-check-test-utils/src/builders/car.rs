//! CARv1 fixture builder

use super::deterministic_bytes;
use discover_check_core::block::{CODEC_DAG_CBOR, CODEC_RAW, Cid, MH_SHA2_256, cid_v1};
use sha2::{Digest, Sha256};
use unsigned_varint::encode;
use std::path::{Path, PathBuf};

/// Bytes of a CID section: 1 byte version, 1 byte codec, 2 byte multihash prefix, 32 byte digest
const RAW_CID_LEN: usize = 36;
/// Longest varint a `u64` length can take
const MAX_PREFIX_LEN: usize = 10;

/// Builds a well-formed CARv1 file whose root is a small DAG-CBOR block
pub struct CarFileBuilder {
    seed: u64,
    blocks: Vec<Vec<u8>>,
    total_size: Option<usize>,
}

/// A finished archive
#[derive(Debug, Clone)]
pub struct BuiltCar {
    pub root: Cid,
    pub bytes: Vec<u8>,
    /// Byte offset of every section, root block first
    pub section_offsets: Vec<u64>,
}

impl CarFileBuilder {
    pub fn new() -> Self {
        Self {
            seed: 0,
            blocks: Vec::new(),
            total_size: None,
        }
    }

    /// Different seeds give different roots
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Append a raw-codec block
    pub fn with_block(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.blocks.push(data.into());
        self
    }

    /// Append `count` raw blocks of `size` pseudo-random bytes
    pub fn with_random_blocks(mut self, count: usize, size: usize) -> Self {
        for i in 0..count {
            let seed = self.seed.wrapping_add(i as u64 + 1);
            self.blocks.push(deterministic_bytes(size, seed));
        }
        self
    }

    /// Pad with raw blocks until the file is exactly `size` bytes
    pub fn with_total_size(mut self, size: usize) -> Self {
        self.total_size = Some(size);
        self
    }

    pub fn build(self) -> BuiltCar {
        // DAG-CBOR {"seed": <u64>}
        let mut root_block = vec![0xa1, 0x64];
        root_block.extend_from_slice(b"seed");
        root_block.push(0x1b);
        root_block.extend_from_slice(&self.seed.to_be_bytes());
        let root = sha256_cid(CODEC_DAG_CBOR, &root_block);

        let mut bytes = header(&root);
        let mut section_offsets = Vec::new();
        push_section(&mut bytes, &mut section_offsets, &root, &root_block);
        for block in &self.blocks {
            push_raw_section(&mut bytes, &mut section_offsets, block);
        }

        if let Some(target) = self.total_size {
            assert!(
                target >= bytes.len(),
                "archive is already {} bytes, cannot shrink to {target}",
                bytes.len()
            );
            let mut filler = self.seed;
            while bytes.len() < target {
                let remaining = target - bytes.len();
                filler = filler.wrapping_add(1);
                match padding_payload(remaining) {
                    Some(len) => {
                        push_raw_section(
                            &mut bytes,
                            &mut section_offsets,
                            &deterministic_bytes(len, filler),
                        );
                    }
                    None => {
                        assert!(
                            remaining >= 2 * (RAW_CID_LEN + 2),
                            "cannot pad {remaining} bytes with whole sections"
                        );
                        push_raw_section(&mut bytes, &mut section_offsets, &[filler as u8]);
                    }
                }
            }
        }

        BuiltCar {
            root,
            bytes,
            section_offsets,
        }
    }
}

impl Default for CarFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltCar {
    /// `<root CID>.car`
    pub fn file_name(&self) -> String {
        format!("{}.car", self.root)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the archive under its CID name inside `dir`
    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

fn sha256_cid(codec: u64, data: &[u8]) -> Cid {
    cid_v1(codec, MH_SHA2_256, &Sha256::digest(data)).expect("a SHA-256 digest fits any multihash")
}

fn varint(value: u64) -> Vec<u8> {
    encode::u64(value, &mut encode::u64_buffer()).to_vec()
}

fn header(root: &Cid) -> Vec<u8> {
    let mut link = vec![0u8];
    link.extend_from_slice(&root.to_bytes());

    // {"roots": [42(h'00' || cid)], "version": 1}
    let mut header = vec![0xa2, 0x65];
    header.extend_from_slice(b"roots");
    header.extend_from_slice(&[0x81, 0xd8, 0x2a, 0x58, link.len() as u8]);
    header.extend_from_slice(&link);
    header.push(0x67);
    header.extend_from_slice(b"version");
    header.push(0x01);

    let mut out = varint(header.len() as u64);
    out.extend_from_slice(&header);
    out
}

fn push_section(out: &mut Vec<u8>, offsets: &mut Vec<u64>, cid: &Cid, data: &[u8]) {
    offsets.push(out.len() as u64);
    let cid_bytes = cid.to_bytes();
    out.extend(varint((cid_bytes.len() + data.len()) as u64));
    out.extend_from_slice(&cid_bytes);
    out.extend_from_slice(data);
}

fn push_raw_section(out: &mut Vec<u8>, offsets: &mut Vec<u64>, data: &[u8]) {
    push_section(out, offsets, &sha256_cid(CODEC_RAW, data), data);
}

/// Block length that makes one raw section exactly `remaining` bytes
fn padding_payload(remaining: usize) -> Option<usize> {
    (1..=MAX_PREFIX_LEN).find_map(|prefix| {
        let length = remaining.checked_sub(prefix)?;
        let data = length.checked_sub(RAW_CID_LEN)?;
        (data > 0 && varint(length as u64).len() == prefix).then_some(data)
    })
}
