//! Concurrent signing must never hand the same leaf out twice

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use lamport_merkle_signatures::{Error, HashOracle, MerkleTree, OsRandom};

#[test]
fn test_concurrent_signing_uses_distinct_leaves() {
    let tree = Arc::new(MerkleTree::generate(16, HashOracle::default(), &OsRandom).unwrap());
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let tree = Arc::clone(&tree);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                tree.sign(format!("message {i}"))
                    .unwrap_or_else(|e| panic!("sign {} failed: {}", i, e))
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        let signature = handle.join().expect("signer panicked");
        assert!(tree.verify(&signature).unwrap());
        assert!(
            ids.insert(signature.key_pair_id),
            "leaf {} was used twice",
            signature.key_pair_id
        );
    }

    assert_eq!(ids.len(), 16);
    assert_eq!(tree.used_key_count(), 16);
}

#[test]
fn test_concurrent_signing_past_exhaustion() {
    let tree = MerkleTree::generate(8, HashOracle::default(), &OsRandom).unwrap();

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..12)
            .map(|i| {
                let tree = &tree;
                scope.spawn(move || tree.sign(format!("message {i}")))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("signer panicked"))
            .collect()
    });

    let mut ids = HashSet::new();
    let mut exhausted = 0;
    for result in results {
        match result {
            Ok(signature) => {
                assert!(tree.verify(&signature).unwrap());
                assert!(ids.insert(signature.key_pair_id));
            }
            Err(Error::KeyExhaustion { size: 8 }) => exhausted += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ids.len(), 8);
    assert_eq!(exhausted, 4);
}
