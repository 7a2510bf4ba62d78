//! Quantized ring buffer lending zero-copy byte regions
//!
//! A single reader fills fixed-size sectors ("quanta") from the underlying
//! stream. Consumers receive [`ByteRegion`]s: reference-counted views over one
//! or more sectors. A sector's storage is recycled when the ring wraps around to
//! it and nobody holds a region over it anymore; if a borrower is still alive
//! the ring allocates a fresh sector instead of waiting, so consumers may keep
//! regions for as long as they like.

use crate::{Error, Result, error::ConfigError};
use serde::Serialize;
use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;

/// Default sector size
pub const DEFAULT_QUANTUM: usize = 1 << 20;

/// Fewest sectors a ring is created with
pub const MIN_SECTORS: usize = 4;

#[derive(Clone)]
struct Segment {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl Segment {
    fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    fn len(&self) -> usize {
        self.range.len()
    }
}

/// Immutable view over one or more contiguous sector slices
///
/// Cloning is cheap and shares the underlying storage.
#[derive(Clone, Default)]
pub struct ByteRegion {
    segments: Vec<Segment>,
    len: usize,
}

impl ByteRegion {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an owned buffer as a single-segment region
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        if len == 0 {
            return Self::empty();
        }
        Self {
            segments: vec![Segment {
                data: Arc::new(data),
                range: 0..len,
            }],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct slices backing this region
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// The backing slices in stream order
    pub fn slices(&self) -> impl Iterator<Item = &[u8]> {
        self.segments.iter().map(Segment::as_slice)
    }

    /// Extend this region with `other`, which must directly follow it in the stream
    pub fn append(&mut self, other: ByteRegion) {
        self.len += other.len;
        self.segments.extend(other.segments);
    }

    /// Split off the first `at` bytes, leaving the remainder in `self`
    ///
    /// `at` is clamped to the region length.
    pub fn split_to(&mut self, at: usize) -> ByteRegion {
        let at = at.min(self.len);
        let mut head = ByteRegion::empty();
        let mut wanted = at;

        while wanted > 0 {
            let Some(first) = self.segments.first_mut() else {
                break;
            };
            if first.len() <= wanted {
                wanted -= first.len();
                head.len += first.len();
                head.segments.push(self.segments.remove(0));
            } else {
                let split = first.range.start + wanted;
                head.segments.push(Segment {
                    data: Arc::clone(&first.data),
                    range: first.range.start..split,
                });
                head.len += wanted;
                first.range.start = split;
                wanted = 0;
            }
        }

        self.len -= at;
        head
    }

    /// Copy the region into a contiguous buffer
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for slice in self.slices() {
            out.extend_from_slice(slice);
        }
        out
    }
}

impl std::fmt::Debug for ByteRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteRegion")
            .field("len", &self.len)
            .field("segments", &self.segments.len())
            .finish()
    }
}

/// Anything that hands out consecutive byte regions
pub trait RegionSource {
    /// Return the next region of `min(max, available)` bytes
    ///
    /// A region shorter than `min` is only ever returned at end of stream.
    /// `None` means the stream is exhausted.
    fn next_region(&mut self, min: usize, max: usize) -> Result<Option<ByteRegion>>;
}

/// Sector recycling counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingStats {
    pub sectors_filled: u64,
    pub sectors_reused: u64,
    pub sectors_allocated: u64,
    pub bytes_read: u64,
}

/// Single-consumer ring of fixed-size sectors over a reader
pub struct QuantizedRingBuffer<R: Read> {
    reader: R,
    quantum: usize,
    sectors: Vec<Option<Arc<Vec<u8>>>>,
    next_sector: usize,
    pending: ByteRegion,
    eof: bool,
    stats: RingStats,
}

impl<R: Read> QuantizedRingBuffer<R> {
    pub fn new(reader: R, quantum: usize, sector_count: usize) -> Result<Self> {
        if quantum == 0 {
            return Err(Error::Config(ConfigError::invalid_configuration(
                "ring quantum must be positive",
            )));
        }
        let sector_count = sector_count.max(MIN_SECTORS);
        Ok(Self {
            reader,
            quantum,
            sectors: vec![None; sector_count],
            next_sector: 0,
            pending: ByteRegion::empty(),
            eof: false,
            stats: RingStats::default(),
        })
    }

    /// Sectors needed so a region of `max_region` bytes never stalls on a wrap
    pub fn sectors_for(max_region: usize, quantum: usize) -> usize {
        (2 * max_region).div_ceil(quantum.max(1)) + 2
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    pub fn stats(&self) -> RingStats {
        self.stats
    }

    /// Bytes read from the stream but not yet lent out
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.eof && self.pending.is_empty()
    }

    /// Read the next sector, blocking until it is full or the stream ends
    ///
    /// Returns the number of bytes added; zero means end of stream.
    pub fn fill(&mut self) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }

        let slot = self.next_sector;
        self.next_sector = (self.next_sector + 1) % self.sectors.len();

        let mut storage = match self.sectors[slot].take().map(Arc::try_unwrap) {
            Some(Ok(mut recycled)) => {
                self.stats.sectors_reused += 1;
                recycled.clear();
                recycled
            }
            // still borrowed, the old sector lives on with its borrowers
            Some(Err(_)) | None => {
                self.stats.sectors_allocated += 1;
                Vec::with_capacity(self.quantum)
            }
        };
        storage.resize(self.quantum, 0);

        let filled = read_full(&mut self.reader, &mut storage)?;
        storage.truncate(filled);

        if filled == 0 {
            self.eof = true;
            self.sectors[slot] = Some(Arc::new(storage));
            return Ok(0);
        }
        if filled < self.quantum {
            self.eof = true;
        }

        let data = Arc::new(storage);
        self.sectors[slot] = Some(Arc::clone(&data));
        self.pending.append(ByteRegion {
            segments: vec![Segment {
                data,
                range: 0..filled,
            }],
            len: filled,
        });
        self.stats.sectors_filled += 1;
        self.stats.bytes_read += filled as u64;
        Ok(filled)
    }
}

impl<R: Read> RegionSource for QuantizedRingBuffer<R> {
    fn next_region(&mut self, min: usize, max: usize) -> Result<Option<ByteRegion>> {
        debug_assert!(min <= max, "region bounds inverted: {min} > {max}");
        while self.pending.len() < max && !self.eof {
            self.fill()?;
        }
        if self.pending.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.pending.split_to(max)))
    }
}

/// Fill `buf` completely unless the stream ends first
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Reader returning at most `step` bytes per call, with an interruption in between
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("media error"))
        }
    }

    #[test]
    fn test_regions_cover_stream_in_order() {
        let data = pattern(10_000);
        let mut ring = QuantizedRingBuffer::new(Cursor::new(data.clone()), 64, 4).unwrap();

        let mut seen = Vec::new();
        while let Some(region) = ring.next_region(100, 100).unwrap() {
            assert!(region.len() == 100 || ring.is_exhausted());
            seen.extend(region.to_vec());
        }
        assert_eq!(seen, data);
        assert_eq!(ring.stats().bytes_read, 10_000);
    }

    #[test]
    fn test_region_spans_sector_boundary() {
        let data = pattern(300);
        let mut ring = QuantizedRingBuffer::new(Cursor::new(data.clone()), 64, 4).unwrap();

        let region = ring.next_region(150, 150).unwrap().unwrap();
        assert_eq!(region.len(), 150);
        assert_eq!(region.segment_count(), 3);
        assert_eq!(region.to_vec(), data[..150]);
    }

    #[test]
    fn test_sectors_are_recycled_once_released() {
        let data = pattern(64 * 32);
        let mut ring = QuantizedRingBuffer::new(Cursor::new(data), 64, 4).unwrap();

        while let Some(region) = ring.next_region(64, 64).unwrap() {
            drop(region);
        }
        let stats = ring.stats();
        assert!(stats.sectors_reused > 0, "{stats:?}");
        assert!(stats.sectors_allocated <= 8, "{stats:?}");
    }

    #[test]
    fn test_held_regions_force_fresh_sectors() {
        let data = pattern(64 * 16);
        let mut ring = QuantizedRingBuffer::new(Cursor::new(data.clone()), 64, 4).unwrap();

        let mut held = Vec::new();
        while let Some(region) = ring.next_region(64, 64).unwrap() {
            held.push(region);
        }
        assert_eq!(ring.stats().sectors_reused, 0);

        // borrowed storage was never overwritten
        let joined: Vec<u8> = held.iter().flat_map(|r| r.to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_short_reads_and_interrupts() {
        let data = pattern(1000);
        let reader = Trickle {
            data: data.clone(),
            pos: 0,
            step: 7,
            interrupt: false,
        };
        let mut ring = QuantizedRingBuffer::new(reader, 128, 4).unwrap();

        let mut seen = Vec::new();
        while let Some(region) = ring.next_region(256, 256).unwrap() {
            seen.extend(region.to_vec());
        }
        assert_eq!(seen, data);
    }

    #[test]
    fn test_empty_stream() {
        let mut ring = QuantizedRingBuffer::new(Cursor::new(Vec::new()), 64, 4).unwrap();
        assert!(ring.next_region(1, 10).unwrap().is_none());
        assert!(ring.is_exhausted());
        assert!(ring.next_region(1, 10).unwrap().is_none());
    }

    #[test]
    fn test_io_errors_propagate() {
        let mut ring = QuantizedRingBuffer::new(Failing, 64, 4).unwrap();
        let err = ring.next_region(1, 10).unwrap_err();
        assert!(err.to_string().contains("media error"));
    }

    #[test]
    fn test_zero_quantum_rejected() {
        let result = QuantizedRingBuffer::new(Cursor::new(Vec::new()), 0, 4);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_split_to_and_append() {
        let mut region = ByteRegion::from_vec(vec![1, 2, 3]);
        region.append(ByteRegion::from_vec(vec![4, 5]));

        let head = region.split_to(4);
        assert_eq!(head.to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(region.to_vec(), vec![5]);
        assert_eq!(region.split_to(10).to_vec(), vec![5]);
        assert!(region.is_empty());
    }
}
