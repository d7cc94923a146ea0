use fnv::FnvHashMap;

use rayon::prelude::*;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::handle::SeqId;
use crate::sequence::SequenceStore;
use crate::util::dna;

/// Iterator over the `(position, 2-bit code)` of every k-mer in a
/// sequence that contains only `ACGT`.
pub struct KmerIter<'a> {
    seq: &'a [u8],
    k: usize,
    mask: u64,
    pos: usize,
    code: u64,
    valid: usize,
}

impl<'a> KmerIter<'a> {
    pub fn new(seq: &'a [u8], k: usize) -> Self {
        assert!(k > 0 && k <= 32);
        let mask = if k == 32 { u64::MAX } else { (1 << (2 * k)) - 1 };
        KmerIter {
            seq,
            k,
            mask,
            pos: 0,
            code: 0,
            valid: 0,
        }
    }
}

impl<'a> Iterator for KmerIter<'a> {
    type Item = (usize, u64);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.seq.len() {
            let base = self.seq[self.pos];
            self.pos += 1;
            match dna::encode_base(base) {
                Some(bits) => {
                    self.code = ((self.code << 2) | bits) & self.mask;
                    self.valid += 1;
                    if self.valid >= self.k {
                        return Some((self.pos - self.k, self.code));
                    }
                }
                None => {
                    self.valid = 0;
                    self.code = 0;
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KmerPos {
    pub seq: SeqId,
    pub pos: u32,
}

/// Position index of all k-mers of a sequence set, built once and
/// then only read.
#[derive(Debug, Clone)]
pub struct KmerIndex {
    k: usize,
    positions: FnvHashMap<u64, Vec<KmerPos>>,
}

impl KmerIndex {
    /// Index the given strands. K-mers occurring more than
    /// `max_occurrences` times are dropped, as they only produce
    /// uninformative seeds.
    pub fn build(
        store: &SequenceStore,
        ids: &[SeqId],
        k: usize,
        max_occurrences: usize,
    ) -> Self {
        let t = std::time::Instant::now();

        let per_sequence: Vec<Vec<(u64, KmerPos)>> = ids
            .par_iter()
            .map(|&id| {
                KmerIter::new(store.seq(id), k)
                    .map(|(pos, code)| {
                        let pos = pos as u32;
                        (code, KmerPos { seq: id, pos })
                    })
                    .collect()
            })
            .collect();

        let mut positions: FnvHashMap<u64, Vec<KmerPos>> = FnvHashMap::default();
        for kmers in per_sequence {
            for (code, kpos) in kmers {
                positions.entry(code).or_default().push(kpos);
            }
        }

        let before = positions.len();
        positions.retain(|_, occ| occ.len() <= max_occurrences);

        debug!(
            "indexed {} distinct {}-mers ({} too frequent) in {:.3} ms",
            positions.len(),
            k,
            before - positions.len(),
            t.elapsed().as_secs_f64() * 1000.0
        );

        KmerIndex { k, positions }
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn get(&self, code: u64) -> &[KmerPos] {
        self.positions
            .get(&code)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn distinct_kmers(&self) -> usize {
        self.positions.len()
    }
}
