//! Error types for key generation, signing and verification

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Every leaf of the tree has signed a message. Provision a new tree.
    #[error("all {size} one-time keys of this tree have been used")]
    KeyExhaustion { size: usize },

    #[error("cannot build key tree: {0}")]
    Construction(String),

    /// A signature, key or snapshot is structurally malformed.
    #[error("malformed input: {0}")]
    Validation(String),

    /// The randomness source failed. Never retried here.
    #[error("randomness source failed: {0}")]
    Infrastructure(#[from] rand::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
