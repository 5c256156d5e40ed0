//! Random hexadecimal identifiers for annotations, cutouts and layers.

use rand::{rngs::StdRng, Rng, SeedableRng};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Length of a viewer annotation id.
pub const ANNOTATION_ID_DIGITS: usize = 40;

/// Length of the tag appended to cutout names and new layer paths.
pub const TAG_DIGITS: usize = 16;

/// Produces hex ids from a seedable generator.
///
/// A fixed seed makes every id reproducible, which tests rely on.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    rng: StdRng,
}

impl IdGenerator {
    /// Creates a generator from `seed`, or from OS entropy when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = match seed {
            Some(seed) => seed,
            None => rand::rng().random::<u64>(),
        };
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `digits` lowercase hex characters.
    pub fn hex(&mut self, digits: usize) -> String {
        (0..digits)
            .map(|_| HEX_DIGITS[self.rng.random_range(0..HEX_DIGITS.len())] as char)
            .collect()
    }

    /// A fresh annotation record id.
    pub fn annotation_id(&mut self) -> String {
        self.hex(ANNOTATION_ID_DIGITS)
    }

    /// A short tag for directory and layer names.
    pub fn tag(&mut self) -> String {
        self.hex(TAG_DIGITS)
    }
}
