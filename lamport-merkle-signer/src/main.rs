use lamport_merkle_signatures::HashAlgorithm;
use lamport_merkle_signer::{key_gen, sign, verify};

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Sign files with a tree of Lamport one-time keys")]
struct Arguments {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key tree and publish its root
    KeyGen {
        tree: PathBuf,
        root: PathBuf,
        num_messages: usize,
        #[arg(long, value_enum, default_value_t = Algorithm::Sha256)]
        algorithm: Algorithm,
    },
    /// Sign a file with the next unused leaf
    Sign {
        message: PathBuf,
        tree: PathBuf,
        signature: PathBuf,
    },
    /// Check a signature against a published root
    Verify {
        message: PathBuf,
        signature: PathBuf,
        root: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Algorithm {
    Sha256,
    Blake3,
}

impl From<Algorithm> for HashAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Sha256 => HashAlgorithm::Sha256,
            Algorithm::Blake3 => HashAlgorithm::Blake3,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Arguments::parse();
    use Command::*;
    match args.cmd {
        KeyGen {
            tree,
            root,
            num_messages,
            algorithm,
        } => {
            let published = key_gen(&tree, &root, num_messages, algorithm.into())?;
            println!("{}", published.root_hash);
        }
        Sign {
            message,
            tree,
            signature,
        } => {
            let (merkle_signature, remaining) = sign(&message, &tree, &signature)?;
            eprintln!(
                "signed with leaf {}, {} remaining",
                merkle_signature.key_pair_id, remaining
            );
        }
        Verify {
            message,
            signature,
            root,
        } => {
            println!("signature validity: {}", verify(&message, &signature, &root)?);
        }
    }
    Ok(())
}
