//! Seeded random streams. Every random decision in the crate draws from a
//! [`Stream`] derived from the run seed plus a contextual salt, so the same
//! decision point in the same seeded run always sees the same sequence and
//! unrelated decision points never share one.
//!
//! The generator is a mulberry-style 32-bit mix owned by this crate: the bit
//! stream is part of the save-compatibility contract and must not change
//! between releases, which rules out delegating to `rand`'s unstable small
//! RNGs. [`Stream`] implements [`rand::RngCore`] so the usual `Rng` / slice
//! sampling adapters work on top of it.

use core::convert::Infallible;
use rand::Rng;
use rand::rand_core::TryRng;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stream {
    state: u32,
}

impl Stream {
    pub fn new(seed: u64) -> Self {
        Self {
            state: (seed ^ (seed >> 32)) as u32,
        }
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Bernoulli roll with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}

impl TryRng for Stream {
    type Error = Infallible;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut r = self.state;
        r = (r ^ (r >> 15)).wrapping_mul(r | 1);
        r ^= r.wrapping_add((r ^ (r >> 7)).wrapping_mul(r | 61));
        Ok(r ^ (r >> 14))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        Ok((u64::from(self.next_u32()) << 32) | u64::from(self.next_u32()))
    }

    fn try_fill_bytes(&mut self, dst: &mut [u8]) -> Result<(), Self::Error> {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
        Ok(())
    }
}

/// Stream for level-wide decisions (generation, placement).
pub fn level_stream(seed: u64, level: u32) -> Stream {
    Stream::new(seed.wrapping_add(u64::from(level)))
}

/// Stream for decisions tied to one tile of one level.
pub fn tile_stream(seed: u64, level: u32, flat_index: u16) -> Stream {
    Stream::new(
        seed.wrapping_add(u64::from(level) * 10_000)
            .wrapping_add(u64::from(flat_index)),
    )
}

/// Stream for a named effect, independent of any tile.
pub fn effect_stream(seed: u64, level: u32, name: &str, offset: u64) -> Stream {
    Stream::new(
        seed.wrapping_add(u64::from(level) * 1_000)
            .wrapping_add(u64::from(str_salt(name)))
            .wrapping_add(offset),
    )
}

fn str_salt(name: &str) -> u32 {
    name.bytes()
        .fold(0u32, |hash, byte| hash.wrapping_mul(31).wrapping_add(byte.into()))
}

/// Weighted pick over `(item, weight)` entries; zero-weight entries never win.
pub fn pick_weighted<'a, T>(rng: &mut Stream, entries: &'a [(T, u32)]) -> Option<&'a T> {
    let total: u64 = entries.iter().map(|(_, weight)| u64::from(*weight)).sum();
    if total == 0 {
        return None;
    }
    let mut roll = (rng.next_f64() * total as f64) as u64;
    for (item, weight) in entries {
        let weight = u64::from(*weight);
        if roll < weight {
            return Some(item);
        }
        roll -= weight;
    }
    entries.last().map(|(item, _)| item)
}
