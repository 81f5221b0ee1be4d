//! File-based key generation, signing and verification.

use lamport_merkle_signatures::{
    Digest, HashAlgorithm, HashOracle, MerkleSignature, MerkleTree, OsRandom, TreeSnapshot,
};

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};
use tracing::{info, warn};

/// What a verifier needs: the root and the hash it was built with.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRoot {
    pub algorithm: HashAlgorithm,
    pub root_hash: Digest,
}

pub fn read_json<T: DeserializeOwned>(file: &Path) -> anyhow::Result<T> {
    let f = File::open(file).with_context(|| format!("opening {}", file.display()))?;
    serde_json::from_reader(BufReader::new(f))
        .with_context(|| format!("decoding {}", file.display()))
}

/// Writes next to `file` and renames over it, so a crash never leaves a
/// half-written tree behind.
pub fn write_json<T: Serialize>(value: &T, file: &Path) -> anyhow::Result<()> {
    let staging = file.with_extension("tmp");
    {
        let f = File::create(&staging)
            .with_context(|| format!("creating {}", staging.display()))?;
        let mut writer = BufWriter::new(f);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&staging, file).with_context(|| format!("replacing {}", file.display()))?;
    Ok(())
}

fn read_message(file: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("reading {}", file.display()))
}

/// Generates a tree of `num_messages` leaves, writes its snapshot to `tree`
/// and its published root to `root`.
pub fn key_gen(
    tree: &Path,
    root: &Path,
    num_messages: usize,
    algorithm: HashAlgorithm,
) -> anyhow::Result<PublishedRoot> {
    let oracle = HashOracle::new(algorithm);
    let key_tree = MerkleTree::generate(num_messages, oracle, &OsRandom)?;
    let published = PublishedRoot {
        algorithm,
        root_hash: *key_tree.root_hash(),
    };
    write_json(&key_tree.snapshot(), tree)?;
    write_json(&published, root)?;
    info!(root = %published.root_hash, num_messages, "generated key tree");
    Ok(published)
}

/// Signs `message` with the next unused leaf of `tree`. Returns the
/// signature and the number of leaves left.
///
/// The tree file is rewritten before the signature is, so a leaf is never
/// handed out twice even if writing the signature fails.
pub fn sign(
    message: &Path,
    tree: &Path,
    signature: &Path,
) -> anyhow::Result<(MerkleSignature, usize)> {
    let snapshot: TreeSnapshot = read_json(tree)?;
    let key_tree = MerkleTree::restore(snapshot)?;
    let message = read_message(message)?;

    let merkle_signature = key_tree.sign(&message)?;
    write_json(&key_tree.snapshot(), tree)?;
    write_json(&merkle_signature, signature)?;
    Ok((merkle_signature, key_tree.remaining()))
}

/// Checks the signature file against the message file and a published root.
/// A signature over some other message is invalid.
pub fn verify(message: &Path, signature: &Path, root: &Path) -> anyhow::Result<bool> {
    let published: PublishedRoot = read_json(root)?;
    let merkle_signature: MerkleSignature = read_json(signature)?;
    let message = read_message(message)?;
    if merkle_signature.message != message {
        warn!("signature was made over a different message");
        return Ok(false);
    }

    let oracle = HashOracle::new(published.algorithm);
    Ok(merkle_signature.verify(&oracle, &published.root_hash)?)
}
