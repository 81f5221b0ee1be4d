//! Hash-based signatures: Lamport one-time keys composed into a bounded
//! many-time scheme by a Merkle tree.
//!
//! A [`MerkleTree`] of `N` leaves signs up to `N` messages. Each
//! [`MerkleSignature`] carries the leaf's Lamport public key and the path of
//! sibling digests up to the tree's root, so anyone holding the published
//! [`MerkleTree::root_hash`] can check it.
//!
//! ```
//! use lamport_merkle_signatures::{HashOracle, MerkleTree, OsRandom};
//!
//! let tree = MerkleTree::generate(4, HashOracle::default(), &OsRandom)?;
//! let signature = tree.sign("hello")?;
//! assert!(tree.verify(&signature)?);
//! assert!(signature.verify(tree.oracle(), tree.root_hash())?);
//! # Ok::<(), lamport_merkle_signatures::Error>(())
//! ```
//!
//! Security rests only on the collision resistance of the hash. A leaf that
//! signs twice reveals enough seeds to forge, so the tree hands out each leaf
//! exactly once, even under concurrent signing.

pub mod error;
pub mod lamport;
pub mod merkle;
pub mod oracle;

pub use error::{Error, Result};
pub use merkle::{LeafKeyPair, MerkleSignature, MerkleTree, TreeSnapshot};
pub use oracle::{Digest, HashAlgorithm, HashOracle, OsRandom, RandomnessSource, SeededRandom};
