//! Builders for on-disk fixtures

mod car;
mod catalog;
mod drive;

pub use car::{BuiltCar, CarFileBuilder};
pub use catalog::{CatalogBuilder, commitment_low};
pub use drive::DriveFixture;

/// Reproducible pseudo-random bytes for a given seed
pub fn deterministic_bytes(size: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9e37_79b9_7f4a_7c15) | 1;
    (0..size)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as u8
        })
        .collect()
}
