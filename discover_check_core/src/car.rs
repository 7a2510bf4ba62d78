//! Structural validation of CARv1 archives
//!
//! A CARv1 file is a varint-framed DAG-CBOR header followed by varint-framed
//! sections, each a CID and the block bytes it names. The check decodes the
//! header and the first few sections in full, then walks every remaining
//! section header so the last section is known to end exactly at end of file,
//! and finally reads the trailing window back from disk.
//!
//! Length prefixes are unsigned varints and section CIDs are read straight off
//! the stream, so the walk never needs more than one section in memory.

use crate::block::{Cid, MH_IDENTITY, MH_SHA2_256};
use crate::{Error, Result, error::IoError, error::StructureError};
use cid::Version;
use log::{debug, trace};
use serde_cbor::Value;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use unsigned_varint::io::ReadError;

/// Sections decoded in full after the header
pub const DEFAULT_HEAD_BLOCKS: usize = 15;
/// Bytes read back from the end of the file
pub const DEFAULT_TAIL_WINDOW: u64 = 1 << 20;

const MAX_HEADER_LEN: u64 = 1 << 20;
const MAX_SECTION_LEN: u64 = 32 << 20;
const CID_LINK_TAG: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureCheckConfig {
    pub head_blocks: usize,
    pub tail_window: u64,
}

impl Default for StructureCheckConfig {
    fn default() -> Self {
        Self {
            head_blocks: DEFAULT_HEAD_BLOCKS,
            tail_window: DEFAULT_TAIL_WINDOW,
        }
    }
}

/// Decoded CAR header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarHeader {
    pub version: u64,
    pub roots: Vec<Cid>,
    /// Bytes taken by the length prefix and the header itself
    pub encoded_len: u64,
}

/// What a successful structure check saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarSummary {
    pub header: CarHeader,
    pub sections: u64,
    pub sections_verified: usize,
    pub file_size: u64,
}

/// Check the archive at `path` against the root its name promises
pub fn check_file(
    path: &Path,
    expected_root: &Cid,
    config: &StructureCheckConfig,
) -> Result<CarSummary> {
    let file = File::open(path).map_err(|e| IoError::from_std(e).with_path(path))?;
    let file_size = file
        .metadata()
        .map_err(|e| IoError::from_std(e).with_path(path))?
        .len();
    check_reader(BufReader::new(file), file_size, expected_root, config)
}

/// Check an archive of `file_size` bytes read through `reader`
pub fn check_reader<R: Read + Seek>(
    mut reader: BufReader<R>,
    file_size: u64,
    expected_root: &Cid,
    config: &StructureCheckConfig,
) -> Result<CarSummary> {
    if file_size == 0 {
        return Err(StructureError::header("empty file").into());
    }
    let header = read_header(&mut reader)?;

    let Some(root) = header.roots.first() else {
        return Err(StructureError::header("no roots").into());
    };
    if root != expected_root {
        return Err(StructureError::RootMismatch {
            found: root.to_string(),
            expected: expected_root.to_string(),
        }
        .into());
    }

    let mut offset = header.encoded_len;
    let mut sections = 0u64;

    while (sections as usize) < config.head_blocks && offset < file_size {
        offset += read_section(&mut reader, offset, file_size, sections as usize)?;
        sections += 1;
    }
    let sections_verified = sections as usize;
    trace!("{sections_verified} head sections verified, walking from offset {offset}");

    while offset < file_size {
        offset += skip_section(&mut reader, offset, file_size, sections as usize)?;
        sections += 1;
    }
    if offset != file_size {
        // head sections ran past the size observed at open time
        return Err(StructureError::TrailingBytes {
            offset: file_size,
            remaining: offset - file_size,
        }
        .into());
    }

    check_tail(reader.get_mut(), file_size, config.tail_window)?;

    debug!(
        "CAR v{} with {sections} sections ({sections_verified} verified), {file_size} bytes",
        header.version
    );
    Ok(CarSummary {
        header,
        sections,
        sections_verified,
        file_size,
    })
}

/// Read and decode the length-prefixed DAG-CBOR header
pub fn read_header<R: Read>(reader: &mut R) -> Result<CarHeader> {
    let (length, prefix) = read_length(reader)
        .map_err(|e| StructureError::header(format!("unreadable length prefix: {e}")))?;
    if length == 0 || length > MAX_HEADER_LEN {
        return Err(StructureError::header(format!("implausible header length {length}")).into());
    }

    let mut raw = vec![0u8; length as usize];
    reader
        .read_exact(&mut raw)
        .map_err(|e| StructureError::header(format!("truncated header: {e}")))?;

    let value: Value = serde_cbor::from_slice(&raw)
        .map_err(|e| StructureError::header(format!("invalid CBOR: {e}")))?;
    let Value::Map(map) = value else {
        return Err(StructureError::header("header is not a map").into());
    };

    let version = match map.get(&Value::Text("version".to_string())) {
        Some(Value::Integer(v)) => u64::try_from(*v)
            .map_err(|_| StructureError::header(format!("invalid version {v}")))?,
        _ => return Err(StructureError::header("missing version").into()),
    };
    if version != 1 {
        return Err(StructureError::header(format!("unsupported CAR version {version}")).into());
    }

    let Some(Value::Array(entries)) = map.get(&Value::Text("roots".to_string())) else {
        return Err(StructureError::header("missing roots").into());
    };
    let roots = entries
        .iter()
        .map(decode_link)
        .collect::<std::result::Result<Vec<_>, String>>()
        .map_err(StructureError::header)?;

    Ok(CarHeader {
        version,
        roots,
        encoded_len: prefix + length,
    })
}

/// A DAG-CBOR link: tag 42 over a byte string holding 0x00 and the binary CID
fn decode_link(value: &Value) -> std::result::Result<Cid, String> {
    let inner = match value {
        Value::Tag(CID_LINK_TAG, inner) => inner.as_ref(),
        Value::Tag(tag, _) => return Err(format!("unexpected CBOR tag {tag} in roots")),
        other => other,
    };
    let Value::Bytes(bytes) = inner else {
        return Err("root is not a CID link".to_string());
    };
    match bytes.split_first() {
        Some((&0x00, cid)) => Cid::try_from(cid).map_err(|e| format!("invalid root CID: {e}")),
        _ => Err("root link lacks the identity multibase prefix".to_string()),
    }
}

/// Length prefix and the number of bytes it took
fn read_length<R: Read>(reader: &mut R) -> std::result::Result<(u64, u64), ReadError> {
    let length = unsigned_varint::io::read_u64(&mut *reader)?;
    let mut buf = unsigned_varint::encode::u64_buffer();
    // decoding rejects non-minimal encodings, so re-encoding gives the prefix size
    let prefix = unsigned_varint::encode::u64(length, &mut buf).len() as u64;
    Ok((length, prefix))
}

/// Fully decode one section, returning the bytes it took
fn read_section<R: Read>(
    reader: &mut R,
    offset: u64,
    file_size: u64,
    index: usize,
) -> Result<u64> {
    let block_err = |reason: String| Error::from(StructureError::block(index, offset, reason));

    let (length, prefix) = read_length(reader).map_err(|e| block_err(e.to_string()))?;
    if length == 0 {
        return Err(zero_fill(offset, file_size));
    }
    check_section_length(length, index, offset)?;

    let mut section = vec![0u8; length as usize];
    reader
        .read_exact(&mut section)
        .map_err(|e| block_err(format!("section of {length} bytes is truncated: {e}")))?;

    let mut data = section.as_slice();
    let cid = Cid::read_bytes(&mut data).map_err(|e| block_err(format!("invalid CID: {e}")))?;
    let digest = cid.hash().digest();

    if cid.version() == Version::V1 && cid.hash().code() == MH_IDENTITY {
        if digest != data {
            return Err(block_err("identity CID does not match block data".to_string()));
        }
    } else if cid.hash().code() == MH_SHA2_256 && digest != Sha256::digest(data).as_slice() {
        return Err(block_err(format!("block data does not hash to {cid}")));
    }

    Ok(prefix + length)
}

/// Step over one section without reading its body
fn skip_section<R: Read + Seek>(
    reader: &mut BufReader<R>,
    offset: u64,
    file_size: u64,
    index: usize,
) -> Result<u64> {
    let (length, prefix) =
        read_length(reader).map_err(|e| StructureError::block(index, offset, e.to_string()))?;
    if length == 0 {
        return Err(zero_fill(offset, file_size));
    }
    check_section_length(length, index, offset)?;

    let end = offset + prefix + length;
    if end > file_size {
        return Err(StructureError::block(
            index,
            offset,
            format!(
                "section of {length} bytes extends {} bytes past end of file",
                end - file_size
            ),
        )
        .into());
    }

    let skip = i64::try_from(length)
        .map_err(|_| StructureError::block(index, offset, "section length overflows"))?;
    reader
        .seek_relative(skip)
        .map_err(|e| StructureError::block(index, offset, format!("seek failed: {e}")))?;
    Ok(prefix + length)
}

/// Zero fill where a section should start is trailing garbage, not a section
fn zero_fill(offset: u64, file_size: u64) -> Error {
    StructureError::TrailingBytes {
        offset,
        remaining: file_size.saturating_sub(offset),
    }
    .into()
}

fn check_section_length(length: u64, index: usize, offset: u64) -> Result<()> {
    if length == 0 {
        return Err(StructureError::block(index, offset, "zero-length section").into());
    }
    if length > MAX_SECTION_LEN {
        return Err(StructureError::block(
            index,
            offset,
            format!("section length {length} exceeds {MAX_SECTION_LEN}"),
        )
        .into());
    }
    Ok(())
}

/// Read the last `window` bytes back and require end of file right after them
fn check_tail<R: Read + Seek>(reader: &mut R, file_size: u64, window: u64) -> Result<()> {
    let window = window.min(file_size);
    let start = file_size - window;

    reader
        .seek(SeekFrom::Start(start))
        .map_err(|e| StructureError::tail(start, format!("unable to seek: {e}")))?;

    let mut limited = reader.by_ref().take(window);
    let copied = io::copy(&mut limited, &mut io::sink())
        .map_err(|e| StructureError::tail(start, e.to_string()))?;
    if copied != window {
        return Err(StructureError::tail(
            start + copied,
            format!("only {copied} of {window} bytes readable"),
        )
        .into());
    }

    let mut next = [0u8; 1];
    let extra = loop {
        match reader.read(&mut next) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StructureError::tail(file_size, e.to_string()).into()),
        }
    };
    if extra != 0 {
        return Err(StructureError::TrailingBytes {
            offset: file_size,
            remaining: extra as u64,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{CODEC_DAG_CBOR, CODEC_RAW, cid_v1};
    use std::io::Cursor;

    fn varint(value: u64) -> Vec<u8> {
        unsigned_varint::encode::u64(value, &mut unsigned_varint::encode::u64_buffer()).to_vec()
    }

    /// Minimal CARv1 writer; the shared test builders cover the richer cases
    fn car_bytes(root: &Cid, blocks: &[&[u8]]) -> Vec<u8> {
        let mut link = vec![0u8];
        link.extend_from_slice(&root.to_bytes());

        let mut header = vec![0xa2, 0x65];
        header.extend_from_slice(b"roots");
        header.extend_from_slice(&[0x81, 0xd8, 0x2a, 0x58, link.len() as u8]);
        header.extend_from_slice(&link);
        header.push(0x67);
        header.extend_from_slice(b"version");
        header.push(0x01);

        let mut out = varint(header.len() as u64);
        out.extend_from_slice(&header);
        for block in blocks {
            let cid = cid_v1(CODEC_RAW, MH_SHA2_256, &Sha256::digest(block)).unwrap();
            let mut section = cid.to_bytes();
            section.extend_from_slice(block);
            out.extend(varint(section.len() as u64));
            out.extend(section);
        }
        out
    }

    fn root() -> Cid {
        cid_v1(CODEC_DAG_CBOR, MH_SHA2_256, &[5u8; 32]).unwrap()
    }

    fn check(bytes: Vec<u8>, config: &StructureCheckConfig) -> Result<CarSummary> {
        let size = bytes.len() as u64;
        check_reader(BufReader::new(Cursor::new(bytes)), size, &root(), config)
    }

    #[test]
    fn test_header_roundtrip() {
        let bytes = car_bytes(&root(), &[]);
        let header = read_header(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(header.version, 1);
        assert_eq!(header.roots, vec![root()]);
        assert_eq!(header.encoded_len, bytes.len() as u64);
    }

    #[test]
    fn test_valid_archive_walks_past_head_blocks() {
        let blocks: Vec<Vec<u8>> = (0..40u8).map(|i| vec![i; 100 + i as usize]).collect();
        let refs: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
        let summary = check(car_bytes(&root(), &refs), &StructureCheckConfig::default()).unwrap();

        assert_eq!(summary.sections, 40);
        assert_eq!(summary.sections_verified, 15);
    }

    #[test]
    fn test_short_archive_within_head_blocks_passes() {
        let summary = check(
            car_bytes(&root(), &[b"one", b"two"]),
            &StructureCheckConfig::default(),
        )
        .unwrap();
        assert_eq!(summary.sections, 2);
    }

    #[test]
    fn test_root_mismatch() {
        let other = cid_v1(CODEC_DAG_CBOR, MH_SHA2_256, &[6u8; 32]).unwrap();
        let err = check(car_bytes(&other, &[b"x"]), &StructureCheckConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Structure(StructureError::RootMismatch { .. })));
    }

    #[test]
    fn test_corrupt_head_block_reports_index() {
        let mut bytes = car_bytes(&root(), &[b"first block", b"second block"]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        match check(bytes, &StructureCheckConfig::default()).unwrap_err() {
            Error::Structure(StructureError::Block { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_truncated_tail_section_reports_index_and_offset() {
        let blocks: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 64]).collect();
        let refs: Vec<&[u8]> = blocks.iter().map(Vec::as_slice).collect();
        let mut bytes = car_bytes(&root(), &refs);
        bytes.truncate(bytes.len() - 10);

        let config = StructureCheckConfig {
            head_blocks: 5,
            ..StructureCheckConfig::default()
        };
        match check(bytes, &config).unwrap_err() {
            Error::Structure(StructureError::Block { index, offset, .. }) => {
                assert_eq!(index, 19);
                assert!(offset > 0);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_single_trailing_zero_byte_fails() {
        let mut bytes = car_bytes(&root(), &[b"payload"]);
        bytes.push(0);
        let err = check(bytes, &StructureCheckConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Structure(StructureError::TrailingBytes { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_single_nonzero_trailing_byte_fails() {
        let mut bytes = car_bytes(&root(), &[b"payload"]);
        bytes.push(0x01);
        let section_start = bytes.len() as u64 - 1;

        // once while decoding head sections, once while walking past them
        for head_blocks in [DEFAULT_HEAD_BLOCKS, 0] {
            let config = StructureCheckConfig {
                head_blocks,
                ..StructureCheckConfig::default()
            };
            match check(bytes.clone(), &config).unwrap_err() {
                Error::Structure(StructureError::Block { index, offset, .. }) => {
                    assert_eq!(index, 1);
                    assert_eq!(offset, section_start);
                }
                other => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn test_cidv0_section_is_verified() {
        let block = b"dag-pb bytes".as_slice();
        let mut section = vec![0x12, 0x20];
        section.extend_from_slice(&Sha256::digest(block));
        section.extend_from_slice(block);

        let mut bytes = car_bytes(&root(), &[]);
        bytes.extend(varint(section.len() as u64));
        bytes.extend(section);
        let summary = check(bytes.clone(), &StructureCheckConfig::default()).unwrap();
        assert_eq!(summary.sections, 1);

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(check(bytes, &StructureCheckConfig::default()).is_err());
    }

    #[test]
    fn test_empty_file() {
        let err = check(Vec::new(), &StructureCheckConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Structure(StructureError::Header { .. })));
    }

    #[test]
    fn test_tail_window_larger_than_file() {
        let config = StructureCheckConfig {
            head_blocks: 0,
            tail_window: 1 << 30,
        };
        assert!(check(car_bytes(&root(), &[b"tiny"]), &config).is_ok());
    }

    #[test]
    fn test_garbage_header() {
        let err = check(vec![0x05, 1, 2, 3, 4, 5], &StructureCheckConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Structure(StructureError::Header { .. })));
    }
}
