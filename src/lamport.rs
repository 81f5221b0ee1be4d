use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::oracle::{Digest, HashOracle, RandomnessSource};

/// Number of bit positions a key covers, one per selector bit of a
/// message digest.
pub const KEY_LENGTH: usize = Digest::BITS;

/// A 32 byte secret. A signature reveals one seed from every pair of a
/// [`PrivateKey`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Seed([u8; 32]);

impl Seed {
    fn generate(source: &dyn RandomnessSource) -> Result<Seed> {
        let mut bytes = [0u8; 32];
        source.fill(&mut bytes)?;
        Ok(Seed(bytes))
    }

    fn digest(&self, oracle: &HashOracle) -> Result<Digest> {
        oracle.digest_json(self)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(..)")
    }
}

/// A private key is what you generate and keep in order to sign one
/// message. From it you derive a [`PublicKey`] and hand that out.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<[Seed; 2]>")]
pub struct PrivateKey {
    pairs: Vec<[Seed; 2]>,
}

impl PrivateKey {
    /// Draws [`KEY_LENGTH`] independent pairs of seeds from `source`.
    pub fn generate(source: &dyn RandomnessSource) -> Result<PrivateKey> {
        let pairs = (0..KEY_LENGTH)
            .map(|_| -> Result<[Seed; 2]> {
                Ok([Seed::generate(source)?, Seed::generate(source)?])
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PrivateKey { pairs })
    }

    /// Creates the [`PublicKey`] associated with this [`PrivateKey`] by
    /// hashing every seed.
    pub fn public_key(&self, oracle: &HashOracle) -> Result<PublicKey> {
        let pairs = self
            .pairs
            .iter()
            .map(|[zero, one]| -> Result<[Digest; 2]> {
                Ok([zero.digest(oracle)?, one.digest(oracle)?])
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PublicKey { pairs })
    }

    /// Signs the message, producing a [`Signature`] which another party can
    /// check with [`PublicKey::verify`]. Each key must sign at most once.
    pub fn sign<A: AsRef<[u8]>>(&self, oracle: &HashOracle, message: A) -> Signature {
        let digest = oracle.digest(message.as_ref());
        let exposed = digest
            .selector_bits()
            .zip(&self.pairs)
            .map(|(bit, pair)| pair[bit].clone())
            .collect();
        Signature { exposed }
    }
}

impl TryFrom<Vec<[Seed; 2]>> for PrivateKey {
    type Error = Error;

    fn try_from(pairs: Vec<[Seed; 2]>) -> Result<Self> {
        check_length("private key", pairs.len())?;
        Ok(PrivateKey { pairs })
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.pairs.serialize(serializer)
    }
}

/// The public key associated with a given [`PrivateKey`]. Entry `[i][b]`
/// is the digest of private seed `[i][b]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<[Digest; 2]>")]
pub struct PublicKey {
    pairs: Vec<[Digest; 2]>,
}

impl PublicKey {
    /// Checks every position of the signature, without stopping at the
    /// first mismatch.
    pub fn verify<A: AsRef<[u8]>>(
        &self,
        oracle: &HashOracle,
        message: A,
        signature: &Signature,
    ) -> bool {
        let digest = oracle.digest(message.as_ref());
        digest
            .selector_bits()
            .zip(self.pairs.iter().zip(&signature.exposed))
            .fold(true, |acc, (bit, (pair, seed))| {
                let matches = seed
                    .digest(oracle)
                    .map_or(false, |revealed| revealed == pair[bit]);
                acc & matches
            })
    }

    pub fn pairs(&self) -> &[[Digest; 2]] {
        &self.pairs
    }
}

impl TryFrom<Vec<[Digest; 2]>> for PublicKey {
    type Error = Error;

    fn try_from(pairs: Vec<[Digest; 2]>) -> Result<Self> {
        check_length("public key", pairs.len())?;
        Ok(PublicKey { pairs })
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.pairs.serialize(serializer)
    }
}

/// The result of [`PrivateKey::sign`]ing a message: one revealed seed per
/// selector bit of the message digest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Vec<Seed>")]
pub struct Signature {
    exposed: Vec<Seed>,
}

impl TryFrom<Vec<Seed>> for Signature {
    type Error = Error;

    fn try_from(exposed: Vec<Seed>) -> Result<Self> {
        check_length("signature", exposed.len())?;
        Ok(Signature { exposed })
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.exposed.serialize(serializer)
    }
}

fn check_length(what: &str, len: usize) -> Result<()> {
    if len != KEY_LENGTH {
        return Err(Error::Validation(format!(
            "{what} has {len} entries, expected {KEY_LENGTH}"
        )));
    }
    Ok(())
}

/// A private key together with the public key derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a fresh private key from `source` and derives its public key.
    pub fn generate(oracle: &HashOracle, source: &dyn RandomnessSource) -> Result<KeyPair> {
        let private_key = PrivateKey::generate(source)?;
        let public_key = private_key.public_key(oracle)?;
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    /// Whether the public half really is derived from the private half.
    pub fn is_aligned(&self, oracle: &HashOracle) -> Result<bool> {
        Ok(self.private_key.public_key(oracle)? == self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{HashAlgorithm, OsRandom, SeededRandom};
    use proptest::prelude::*;

    #[test]
    fn end_to_end() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let oracle = HashOracle::default();
        let KeyPair {
            private_key,
            public_key,
        } = KeyPair::generate(&oracle, &OsRandom)?;
        let message = b"Hello, world!";

        let signature = private_key.sign(&oracle, message);
        assert!(public_key.verify(&oracle, message, &signature));

        let faulty_message = b"Hello, not world!";
        assert!(!public_key.verify(&oracle, faulty_message, &signature));

        let faulty_signature = private_key.sign(&oracle, faulty_message);
        assert!(!public_key.verify(&oracle, message, &faulty_signature));

        assert!(public_key.verify(&oracle, faulty_message, &faulty_signature));
        Ok(())
    }

    #[test]
    fn public_key_hashes_every_seed() {
        let oracle = HashOracle::new(HashAlgorithm::Blake3);
        let pair = KeyPair::generate(&oracle, &SeededRandom::new(1)).unwrap();
        for (seeds, digests) in pair.private_key.pairs.iter().zip(pair.public_key.pairs()) {
            assert_eq!(oracle.digest_json(&seeds[0]).unwrap(), digests[0]);
            assert_eq!(oracle.digest_json(&seeds[1]).unwrap(), digests[1]);
        }
        assert!(pair.is_aligned(&oracle).unwrap());
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let oracle = HashOracle::default();
        let a = KeyPair::generate(&oracle, &SeededRandom::new(9)).unwrap();
        let b = KeyPair::generate(&oracle, &SeededRandom::new(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn signature_selects_by_digest_bits() {
        let oracle = HashOracle::default();
        let pair = KeyPair::generate(&oracle, &SeededRandom::new(2)).unwrap();
        let signature = pair.private_key.sign(&oracle, "hello");
        let digest = oracle.digest("hello");
        for (i, bit) in digest.selector_bits().enumerate() {
            assert_eq!(signature.exposed[i], pair.private_key.pairs[i][bit]);
        }
    }

    #[test]
    fn rejects_wrong_lengths() {
        let oracle = HashOracle::default();
        let pair = KeyPair::generate(&oracle, &SeededRandom::new(3)).unwrap();
        let mut seeds = pair.private_key.sign(&oracle, "x").exposed;
        seeds.pop();
        assert!(matches!(
            Signature::try_from(seeds),
            Err(Error::Validation(_))
        ));

        let mut digests = pair.public_key.pairs.clone();
        digests.push(digests[0]);
        assert!(PublicKey::try_from(digests).is_err());

        let json = serde_json::to_string(&vec![[0u8; 32]; 3]).unwrap();
        assert!(serde_json::from_str::<Signature>(&json).is_err());
    }

    #[test]
    fn survives_json() {
        let oracle = HashOracle::default();
        let pair = KeyPair::generate(&oracle, &SeededRandom::new(4)).unwrap();
        let signature = pair.private_key.sign(&oracle, "persist me");

        let public_key: PublicKey =
            serde_json::from_str(&serde_json::to_string(&pair.public_key).unwrap()).unwrap();
        let signature: Signature =
            serde_json::from_str(&serde_json::to_string(&signature).unwrap()).unwrap();
        assert!(public_key.verify(&oracle, "persist me", &signature));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32, .. ProptestConfig::default()
        })]

        #[test]
        fn really_works(s in "\\PC*") {
            let oracle = HashOracle::default();
            let pair = KeyPair::generate(&oracle, &OsRandom)?;
            let message = s.as_bytes();

            let signature = pair.private_key.sign(&oracle, message);
            prop_assert!(pair.public_key.verify(&oracle, message, &signature));
        }

        #[test]
        fn any_flipped_signature_bit_fails(position in 0..KEY_LENGTH, bit in 0..256usize) {
            let oracle = HashOracle::default();
            let pair = KeyPair::generate(&oracle, &SeededRandom::new(5))?;
            let mut signature = pair.private_key.sign(&oracle, "hello");
            signature.exposed[position].0[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!pair.public_key.verify(&oracle, "hello", &signature));
        }

        #[test]
        fn any_altered_message_byte_fails(
            message in proptest::collection::vec(any::<u8>(), 1..64),
            index in any::<prop::sample::Index>(),
            delta in 1..=255u8,
        ) {
            let oracle = HashOracle::default();
            let pair = KeyPair::generate(&oracle, &SeededRandom::new(6))?;
            let signature = pair.private_key.sign(&oracle, &message);

            let mut altered = message.clone();
            let i = index.index(altered.len());
            altered[i] = altered[i].wrapping_add(delta);
            prop_assert!(!pair.public_key.verify(&oracle, &altered, &signature));
        }
    }
}
