pub(crate) mod internal;

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lamport::{self, KeyPair};
use crate::merkle::internal::*;
use crate::oracle::{Digest, HashAlgorithm, HashOracle, RandomnessSource};

/// Which leaves have signed. Only ever touched under the tree's lock.
#[derive(Debug)]
struct LeafState {
    used: Vec<bool>,
    used_count: usize,
}

/// A tree of Lamport key pairs committed to by a single root digest.
///
/// Every leaf signs exactly one message. The root is the long-term
/// public key: anyone holding it can check a [`MerkleSignature`] with
/// [`MerkleSignature::verify`].
pub struct MerkleTree {
    oracle: HashOracle,
    leaves: Vec<KeyPair>,
    rows: Rows,
    state: Mutex<LeafState>,
}

impl MerkleTree {
    /// Generates `size` fresh key pairs and builds the tree over them.
    /// `size` must be a non-zero power of two.
    pub fn generate(
        size: usize,
        oracle: HashOracle,
        source: &dyn RandomnessSource,
    ) -> Result<MerkleTree> {
        check_size(size)?;
        debug!(size, algorithm = %oracle.algorithm(), "generating leaf key pairs");
        let key_pairs = parallel_map(size, |_| KeyPair::generate(&oracle, source))
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        MerkleTree::build(oracle, key_pairs)
    }

    /// Builds the tree over existing leaf material, all leaves unused.
    ///
    /// Rejects material whose public keys are not derived from their
    /// private keys.
    pub fn from_key_pairs(oracle: HashOracle, key_pairs: Vec<KeyPair>) -> Result<MerkleTree> {
        check_size(key_pairs.len())?;
        let aligned = parallel_map(key_pairs.len(), |i| key_pairs[i].is_aligned(&oracle))
            .into_iter()
            .collect::<Result<Vec<bool>>>()?;
        if let Some(index) = aligned.iter().position(|ok| !ok) {
            return Err(Error::Validation(format!(
                "leaf {index} has a public key that does not match its private key"
            )));
        }
        MerkleTree::build(oracle, key_pairs)
    }

    fn build(oracle: HashOracle, key_pairs: Vec<KeyPair>) -> Result<MerkleTree> {
        check_size(key_pairs.len())?;
        let leaf_digests = parallel_map(key_pairs.len(), |i| {
            oracle.digest_json(&key_pairs[i].public_key)
        })
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
        let rows = Rows::build(&oracle, leaf_digests)?;
        debug!(
            size = key_pairs.len(),
            rows = rows.len(),
            root = %rows.root(),
            "built key tree"
        );

        let state = LeafState {
            used: vec![false; key_pairs.len()],
            used_count: 0,
        };
        Ok(MerkleTree {
            oracle,
            leaves: key_pairs,
            rows,
            state: Mutex::new(state),
        })
    }

    pub fn root_hash(&self) -> &Digest {
        self.rows.root()
    }

    pub fn oracle(&self) -> &HashOracle {
        &self.oracle
    }

    /// Number of leaves.
    pub fn size(&self) -> usize {
        self.leaves.len()
    }

    pub fn used_key_count(&self) -> usize {
        self.state.lock().used_count
    }

    /// How many more messages this tree can sign.
    pub fn remaining(&self) -> usize {
        self.size() - self.used_key_count()
    }

    pub fn is_used(&self, index: usize) -> Option<bool> {
        self.state.lock().used.get(index).copied()
    }

    pub fn public_key(&self, index: usize) -> Option<&lamport::PublicKey> {
        self.leaves.get(index).map(|leaf| &leaf.public_key)
    }

    /// Row 0 holds the leaf digests; the last row holds only the root.
    pub fn rows(&self) -> &[Vec<Digest>] {
        self.rows.levels()
    }

    /// Signs with the lowest-index unused leaf.
    ///
    /// Fails with [`Error::KeyExhaustion`] once every leaf has been used.
    /// Safe to call from several threads: each call consumes its own leaf.
    pub fn sign<A: AsRef<[u8]>>(&self, message: A) -> Result<MerkleSignature> {
        let index = self.reserve_leaf()?;
        let leaf = &self.leaves[index];
        let message = message.as_ref();

        Ok(MerkleSignature {
            key_pair_id: index as u64,
            pub_key: leaf.public_key.clone(),
            message: message.to_vec(),
            signature: leaf.private_key.sign(&self.oracle, message),
            path: self.rows.authentication_path(index),
        })
    }

    /// Finds the first unused leaf and marks it used, in one critical section.
    fn reserve_leaf(&self) -> Result<usize> {
        let size = self.size();
        let (index, remaining) = {
            let mut state = self.state.lock();
            if state.used_count >= size {
                return Err(Error::KeyExhaustion { size });
            }
            let index = state
                .used
                .iter()
                .position(|used| !used)
                .ok_or(Error::KeyExhaustion { size })?;
            state.used[index] = true;
            state.used_count += 1;
            (index, size - state.used_count)
        };

        if remaining == 0 {
            warn!(leaf = index, size, "signing with the last key pair of this tree");
        } else {
            info!(leaf = index, remaining, "consumed one-time key pair");
        }
        Ok(index)
    }

    /// Checks a signature against this tree.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify,
    /// including one that proves membership in some other tree.
    /// [`Error::Validation`] means the signature does not have the shape of
    /// one made by this tree.
    pub fn verify(&self, signature: &MerkleSignature) -> Result<bool> {
        if signature.path.len() != self.rows.len() {
            return Err(Error::Validation(format!(
                "path has {} entries, this tree has {} rows",
                signature.path.len(),
                self.rows.len()
            )));
        }
        if signature.key_pair_id >= self.rows.leaf_count() as u64 {
            return Err(Error::Validation(format!(
                "key pair {} is outside a tree of {} leaves",
                signature.key_pair_id,
                self.rows.leaf_count()
            )));
        }
        signature.verify(&self.oracle, self.root_hash())
    }

    /// A consistent copy of the leaves and their used flags.
    pub fn snapshot(&self) -> TreeSnapshot {
        let state = self.state.lock();
        let leaves = self
            .leaves
            .iter()
            .zip(&state.used)
            .map(|(leaf, used)| LeafKeyPair {
                private_key: leaf.private_key.clone(),
                public_key: leaf.public_key.clone(),
                used: *used,
            })
            .collect();
        TreeSnapshot {
            algorithm: self.oracle.algorithm(),
            leaves,
        }
    }

    /// Rebuilds a tree from a [`TreeSnapshot`], keeping its used flags.
    /// Checked like [`MerkleTree::from_key_pairs`].
    pub fn restore(snapshot: TreeSnapshot) -> Result<MerkleTree> {
        let oracle = HashOracle::new(snapshot.algorithm);
        let (key_pairs, used): (Vec<KeyPair>, Vec<bool>) = snapshot
            .leaves
            .into_iter()
            .map(|leaf| {
                let key_pair = KeyPair {
                    private_key: leaf.private_key,
                    public_key: leaf.public_key,
                };
                (key_pair, leaf.used)
            })
            .unzip();
        let tree = MerkleTree::from_key_pairs(oracle, key_pairs)?;
        {
            let mut state = tree.state.lock();
            state.used_count = used.iter().filter(|used| **used).count();
            state.used = used;
        }
        Ok(tree)
    }
}

impl fmt::Debug for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleTree")
            .field("algorithm", &self.oracle.algorithm())
            .field("size", &self.size())
            .field("root_hash", self.root_hash())
            .field("used_key_count", &self.used_key_count())
            .finish_non_exhaustive()
    }
}

/// One leaf of a persisted tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafKeyPair {
    pub private_key: lamport::PrivateKey,
    pub public_key: lamport::PublicKey,
    pub used: bool,
}

/// Everything needed to resume signing with a tree. Holds private keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub algorithm: HashAlgorithm,
    pub leaves: Vec<LeafKeyPair>,
}

/// A Lamport signature made by one leaf, plus the path from that leaf's
/// public key up to the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleSignature {
    pub key_pair_id: u64,
    pub pub_key: lamport::PublicKey,
    #[serde(with = "hex_bytes")]
    pub message: Vec<u8>,
    pub signature: lamport::Signature,
    /// Sibling digests from the leaf row upwards; the last entry is the root.
    pub path: Vec<Digest>,
}

impl MerkleSignature {
    /// The root this signature claims membership in.
    pub fn claimed_root(&self) -> Option<&Digest> {
        self.path.last()
    }

    /// Checks the signature against a published root, without the tree.
    pub fn verify(&self, oracle: &HashOracle, root: &Digest) -> Result<bool> {
        let (claimed_root, siblings) = self
            .path
            .split_last()
            .ok_or_else(|| Error::Validation("authentication path is empty".into()))?;
        if siblings.len() >= u64::BITS as usize || self.key_pair_id >> siblings.len() != 0 {
            return Err(Error::Validation(format!(
                "key pair {} cannot be reached by a path of {} siblings",
                self.key_pair_id,
                siblings.len()
            )));
        }

        if !self.pub_key.verify(oracle, &self.message, &self.signature) {
            return Ok(false);
        }
        let leaf = oracle.digest_json(&self.pub_key)?;
        let computed = fold_path(oracle, leaf, self.key_pair_id as usize, siblings);
        Ok(computed == *claimed_root && claimed_root == root)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}
