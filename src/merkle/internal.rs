use std::num::NonZeroUsize;
use std::thread;

use crate::error::{Error, Result};
use crate::oracle::{Digest, HashOracle};

/// Below this many items a row is hashed on the calling thread.
const PARALLEL_THRESHOLD: usize = 64;

/// Index of the parent node one row up, `ceil((index + 1) / 2) - 1`.
pub(crate) fn parent(index: usize) -> usize {
    (index + 2) / 2 - 1
}

/// The rows of a binary hash tree.
///
/// Row 0 holds one digest per leaf, every following row half as many, and
/// the last row holds only the root.
///
/// ```text
///     R
///     |\
///     | \
///     A  B
///     |\ |\
///     0 1 2 3
/// ```
///
/// Proving leaf 0 against R takes the path `[1, B, R]`; the verifier
/// rebuilds A from 0 and 1, then R from A and B.
#[derive(PartialEq, Eq, Clone, Debug)]
pub(crate) struct Rows {
    levels: Vec<Vec<Digest>>,
}

impl Rows {
    pub(crate) fn build(oracle: &HashOracle, leaves: Vec<Digest>) -> Result<Rows> {
        check_size(leaves.len())?;
        let mut levels = vec![leaves];
        loop {
            let previous = &levels[levels.len() - 1];
            let n = previous.len();
            if n == 1 {
                return Ok(Rows { levels });
            }
            if n % 2 == 1 {
                return Err(Error::Construction(format!(
                    "row {} has an odd number of digests ({n})",
                    levels.len() - 1
                )));
            }
            let level = parallel_map(n / 2, |i| {
                oracle.combine(&previous[2 * i], &previous[2 * i + 1])
            });
            levels.push(level);
        }
    }

    pub(crate) fn root(&self) -> &Digest {
        &self.levels[self.levels.len() - 1][0]
    }

    pub(crate) fn levels(&self) -> &[Vec<Digest>] {
        &self.levels
    }

    pub(crate) fn len(&self) -> usize {
        self.levels.len()
    }

    pub(crate) fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// One entry per row: the sibling of `index` at each row below the root,
    /// then the root itself.
    pub(crate) fn authentication_path(&self, index: usize) -> Vec<Digest> {
        let mut path = Vec::with_capacity(self.levels.len());
        let mut current = index;
        for row in &self.levels[..self.levels.len() - 1] {
            let sibling = if current % 2 == 1 {
                current - 1
            } else {
                current + 1
            };
            path.push(row[sibling]);
            current = parent(current);
        }
        path.push(*self.root());
        path
    }
}

/// Recomputes the root from a leaf digest and its siblings, bottom up.
pub(crate) fn fold_path(
    oracle: &HashOracle,
    leaf: Digest,
    index: usize,
    siblings: &[Digest],
) -> Digest {
    let mut current_hash = leaf;
    let mut current_index = index;
    for sibling in siblings {
        current_hash = if current_index % 2 == 1 {
            oracle.combine(sibling, &current_hash)
        } else {
            oracle.combine(&current_hash, sibling)
        };
        current_index = parent(current_index);
    }
    current_hash
}

pub(crate) fn check_size(size: usize) -> Result<()> {
    if !size.is_power_of_two() {
        return Err(Error::Construction(format!(
            "leaf count must be a non-zero power of two, got {size}"
        )));
    }
    Ok(())
}

/// Maps `f` over `0..len` on scoped worker threads, keeping the output in
/// index order.
pub(crate) fn parallel_map<U, F>(len: usize, f: F) -> Vec<U>
where
    U: Send,
    F: Fn(usize) -> U + Sync,
{
    let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    if len < PARALLEL_THRESHOLD || workers == 1 {
        return (0..len).map(f).collect();
    }

    let chunk = (len + workers - 1) / workers;
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = (0..len)
            .step_by(chunk)
            .map(|start| {
                let end = (start + chunk).min(len);
                scope.spawn(move || (start..end).map(f).collect::<Vec<U>>())
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}
