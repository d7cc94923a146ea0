/*!
Lock-free union-find over dense `u64` elements, after "Wait-free
Parallel Algorithms for the Union-Find Problem" by Richard J. Anderson
and Heather Woll.

Graph construction glues sequence positions with it from a single
thread; the uneven-coverage baseline labels connected components with
it from many.
*/

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub struct DisjointSets {
    parents: Vec<AtomicU64>,
    ranks: Vec<AtomicU32>,
}

impl DisjointSets {
    /// `size` singleton sets `0..size`.
    pub fn new(size: usize) -> Self {
        DisjointSets {
            parents: (0..size as u64).map(AtomicU64::new).collect(),
            ranks: (0..size).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    #[inline]
    fn parent(&self, x: u64) -> u64 {
        self.parents[x as usize].load(Ordering::SeqCst)
    }

    #[inline]
    fn rank(&self, x: u64) -> u32 {
        self.ranks[x as usize].load(Ordering::SeqCst)
    }

    /// Representative of the set containing `x`, halving the path on
    /// the way up.
    pub fn find(&self, mut x: u64) -> u64 {
        loop {
            let parent = self.parent(x);
            if parent == x {
                return x;
            }
            let grandparent = self.parent(parent);
            // a failed exchange means another thread already moved
            // `x` closer to the root
            let _ = self.parents[x as usize].compare_exchange(
                parent,
                grandparent,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            x = grandparent;
        }
    }

    pub fn same(&self, mut a: u64, mut b: u64) -> bool {
        loop {
            a = self.find(a);
            b = self.find(b);
            if a == b {
                return true;
            }
            // `a` may have been linked under another root meanwhile
            if self.parent(a) == a {
                return false;
            }
        }
    }

    /// Merge the sets of `a` and `b`, returning the new
    /// representative. The root of lower rank, or of lower id on a
    /// tie, is linked under the other.
    pub fn unite(&self, mut a: u64, mut b: u64) -> u64 {
        loop {
            a = self.find(a);
            b = self.find(b);
            if a == b {
                return a;
            }

            let (mut rank_a, mut rank_b) = (self.rank(a), self.rank(b));
            if rank_a > rank_b || (rank_a == rank_b && a < b) {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut rank_a, &mut rank_b);
            }

            if self.parents[a as usize]
                .compare_exchange(a, b, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            if rank_a == rank_b {
                let _ = self.ranks[b as usize].compare_exchange(
                    rank_b,
                    rank_b + 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
            }
            return b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rayon::prelude::*;

    #[test]
    fn unite_and_find() {
        let sets = DisjointSets::new(10);
        assert_eq!(sets.len(), 10);
        assert!(!sets.same(1, 2));

        sets.unite(1, 2);
        sets.unite(2, 5);
        sets.unite(7, 8);

        assert!(sets.same(1, 5));
        assert!(sets.same(8, 7));
        assert!(!sets.same(5, 7));
        assert_eq!(sets.find(1), sets.find(5));
        assert_eq!(sets.find(3), 3);
    }

    #[test]
    fn parallel_chain_collapses_to_one_set() {
        let n = 10_000u64;
        let sets = DisjointSets::new(n as usize);
        (0..n - 1).into_par_iter().for_each(|i| {
            sets.unite(i, i + 1);
        });
        let root = sets.find(0);
        assert!((0..n).all(|i| sets.find(i) == root));
    }
}
