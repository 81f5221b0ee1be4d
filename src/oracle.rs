//! The hash oracle and randomness sources the signature scheme is built on.

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::rngs::{OsRng, StdRng};
use rand::{Fill, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::error::{Error, Result};

/// The hash function behind a [`HashOracle`]. Both are 256-bit and
/// collision resistant; only the first half of the hex rendering is kept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Sha256 => f.write_str("sha256"),
            HashAlgorithm::Blake3 => f.write_str("blake3"),
        }
    }
}

/// Deterministic map from bytes to a 32 character [`Digest`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HashOracle {
    algorithm: HashAlgorithm,
}

impl HashOracle {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        HashOracle { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn digest<A: AsRef<[u8]>>(&self, input: A) -> Digest {
        match self.algorithm {
            HashAlgorithm::Sha256 => Digest::render(&sha2::Sha256::digest(input.as_ref())),
            HashAlgorithm::Blake3 => Digest::render(blake3::hash(input.as_ref()).as_bytes()),
        }
    }

    /// Hashes the compact JSON text of `value`. Seeds render as `[n,n,...]`
    /// and public keys as `[["..",".."],...]`.
    pub fn digest_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest> {
        let text = serde_json::to_vec(value)?;
        Ok(self.digest(text))
    }

    /// Hash of the concatenated renderings, `left` first.
    pub fn combine(&self, left: &Digest, right: &Digest) -> Digest {
        let mut text = [0u8; 2 * Digest::WIDTH];
        text[..Digest::WIDTH].copy_from_slice(&left.0);
        text[Digest::WIDTH..].copy_from_slice(&right.0);
        self.digest(text)
    }
}

/// The rendered output of a [`HashOracle`]: exactly 32 lowercase hex
/// characters, stored as their ASCII bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; Digest::WIDTH]);

impl Digest {
    pub const WIDTH: usize = 32;

    /// Number of selector bits a digest expands to.
    pub const BITS: usize = Digest::WIDTH * 8;

    fn render(hash: &[u8]) -> Digest {
        let mut out = [0u8; Digest::WIDTH];
        // two hex characters per byte
        out.copy_from_slice(hex::encode(&hash[..Digest::WIDTH / 2]).as_bytes());
        Digest(out)
    }

    pub fn as_str(&self) -> &str {
        // only ever holds ASCII hex
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// Bit `index` of the rendering, taking each character's 8-bit code
    /// most significant bit first.
    pub fn selector_bit(&self, index: usize) -> usize {
        bit_of_byteslice(index, &self.0) as usize
    }

    /// All [`Digest::BITS`] selector bits in order.
    pub fn selector_bits(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Digest::BITS).map(|i| self.selector_bit(i))
    }
}

fn bit_of_byteslice(index: usize, bytes: &[u8]) -> bool {
    let byte = bytes[index / 8];
    bit_of_byte(index % 8, byte)
}

fn bit_of_byte(index: usize, byte: u8) -> bool {
    let mask = 0b1000_0000u8 >> index;
    byte & mask == mask
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != Digest::WIDTH {
            return Err(Error::Validation(format!(
                "digest must be {} characters, got {}",
                Digest::WIDTH,
                s.len()
            )));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(Error::Validation(format!(
                "digest {s:?} is not lowercase hex"
            )));
        }
        let mut out = [0u8; Digest::WIDTH];
        out.copy_from_slice(s.as_bytes());
        Ok(Digest(out))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.as_str())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cryptographically secure byte generator. Must be callable from
/// several key generation workers at once.
pub trait RandomnessSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

/// The operating system random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomnessSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        dest.try_fill(&mut OsRng)
    }
}

/// A reproducible generator. Useful for tests and for regenerating known
/// key material; never for keys that protect anything.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        SeededRandom {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomnessSource for SeededRandom {
    fn fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        dest.try_fill(&mut *self.rng.lock())
    }
}
