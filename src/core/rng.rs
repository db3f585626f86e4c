/// Deterministic random source: seedable, reproducible from a share string.
///
/// The generator is a 32-bit Mulberry32 stream. It implements `RngCore` and
/// `SeedableRng` so callers can use it with `rand` distributions, but the
/// engine itself only draws through `next_f64` and `pick` so that a seed
/// string replays the exact same story everywhere.
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

const GOLDEN_STEP: u32 = 0x6D2B_79F5;
const TWO_POW_32: f64 = 4_294_967_296.0;
const POSITIVE_31_BITS: u64 = 0x7fff_ffff;

/// Mulberry32 generator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryRng {
    state: u32,
    seed: u32,
}

impl StoryRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed, seed }
    }

    /// Seed from a share string. Empty or missing strings (and strings that
    /// hash to zero) fall back to a clock-derived seed.
    pub fn from_seed_str(seed: Option<&str>) -> Self {
        let hashed = seed.map(seed_from_str).unwrap_or(0);
        if hashed == 0 {
            Self::new(time_seed())
        } else {
            Self::new(hashed)
        }
    }

    /// The seed this stream started from.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.step()) / TWO_POW_32
    }

    /// Index in `0..len`, or `None` for an empty range.
    pub fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let idx = (self.next_f64() * len as f64) as usize;
        Some(idx.min(len - 1))
    }

    /// Uniformly pick an element of `items`.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        self.pick_index(items.len()).map(|i| &items[i])
    }

    fn step(&mut self) -> u32 {
        self.state = self.state.wrapping_add(GOLDEN_STEP);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }
}

impl RngCore for StoryRng {
    fn next_u32(&mut self) -> u32 {
        self.step()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.step());
        let lo = u64::from(self.step());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for StoryRng {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

/// Polynomial rolling hash (multiplier 131) over UTF-16 code units.
/// The empty string hashes to 0.
pub fn seed_from_str(s: &str) -> u32 {
    s.encode_utf16()
        .fold(0u32, |n, unit| n.wrapping_mul(131).wrapping_add(u32::from(unit)))
}

/// Clock-derived seed masked to the positive 31-bit range.
pub fn time_seed() -> u32 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    (millis & POSITIVE_31_BITS) as u32
}

/// Short base-36 label for displaying a seed (multiplier-33 hash).
pub fn seed_label(s: &str) -> String {
    let h = s
        .encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(33).wrapping_add(u32::from(unit)));
    to_base36(h)
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
