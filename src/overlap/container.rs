use rayon::prelude::*;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::config::Parameters;
use crate::sequence::SequenceStore;

use super::{KmerIndex, Overlap, OverlapDetector};

/// All-vs-all overlaps of a sequence set.
///
/// Only canonical overlaps are stored: `cur` is a forward strand with
/// a smaller record index than `ext`. The other three orientations of
/// each overlap are derived on demand.
#[derive(Debug, Clone, Default)]
pub struct OverlapContainer {
    overlaps: Vec<Overlap>,
}

impl OverlapContainer {
    pub fn from_overlaps(mut overlaps: Vec<Overlap>) -> Self {
        overlaps.sort_by(canonical_order);
        OverlapContainer { overlaps }
    }

    /// Detect overlaps between every pair of distinct sequences in
    /// `store`, on both relative strands. Self-overlaps are not
    /// reported.
    pub fn detect(store: &SequenceStore, params: &Parameters) -> Self {
        let t = std::time::Instant::now();

        let ids = store.all_ids().collect::<Vec<_>>();
        let index = KmerIndex::build(
            store,
            &ids,
            params.kmer_size,
            params.max_kmer_occurrences,
        );
        let detector = OverlapDetector::new(
            &index,
            store,
            params,
            params.match_mode,
            params.max_overlap_divergence,
        );

        let queries = store.forward_ids().collect::<Vec<_>>();
        let candidates: Vec<Overlap> = queries
            .par_iter()
            .flat_map_iter(|&query| {
                detector.overlaps(query, store.seq(query), |target| {
                    target.index() <= query.index()
                })
            })
            .collect();

        let found = candidates.len();
        let overlaps = resolve_conflicts(candidates);

        debug!(
            "{} candidate overlaps, {} kept after conflict resolution",
            found,
            overlaps.len()
        );
        info!(
            "Detected {} overlaps between {} sequences in {:.3} ms",
            overlaps.len(),
            store.len(),
            t.elapsed().as_secs_f64() * 1000.0
        );

        Self::from_overlaps(overlaps)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.overlaps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.overlaps.is_empty()
    }

    pub fn canonical(&self) -> &[Overlap] {
        &self.overlaps
    }
}

fn canonical_order(a: &Overlap, b: &Overlap) -> std::cmp::Ordering {
    a.cur
        .cmp(&b.cur)
        .then(a.ext.cmp(&b.ext))
        .then(a.cur_begin.cmp(&b.cur_begin))
        .then(a.ext_begin.cmp(&b.ext_begin))
        .then(a.cur_end.cmp(&b.cur_end))
        .then(a.ext_end.cmp(&b.ext_end))
}

#[inline]
fn intersects(a: (usize, usize), b: (usize, usize)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Among overlaps of the same pair of strands, drop those that align
/// an already covered region of both sequences at once, preferring less
/// divergent and then longer overlaps. An overlap that shares only one
/// side with a kept one is a distinct repeat copy and stays. The result
/// does not depend on the input order.
pub(crate) fn resolve_conflicts(mut candidates: Vec<Overlap>) -> Vec<Overlap> {
    candidates.sort_by(|a, b| {
        (a.cur, a.ext)
            .cmp(&(b.cur, b.ext))
            .then_with(|| a.preference_cmp(b))
    });

    let mut kept: Vec<Overlap> = Vec::with_capacity(candidates.len());
    let mut group_start = 0;
    for ovlp in candidates {
        if let Some(first) = kept.get(group_start) {
            if (first.cur, first.ext) != (ovlp.cur, ovlp.ext) {
                group_start = kept.len();
            }
        }

        let conflicting = kept[group_start..].iter().any(|k| {
            intersects(
                (k.cur_begin, k.cur_end),
                (ovlp.cur_begin, ovlp.cur_end),
            ) && intersects(
                (k.ext_begin, k.ext_end),
                (ovlp.ext_begin, ovlp.ext_end),
            )
        });

        if conflicting {
            trace!(
                "dropping overlap {} [{}, {}) / {} [{}, {}) in favour of a better one",
                ovlp.cur,
                ovlp.cur_begin,
                ovlp.cur_end,
                ovlp.ext,
                ovlp.ext_begin,
                ovlp.ext_end
            );
        } else {
            kept.push(ovlp);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handle::SeqId;
    use crate::overlap::tests::random_dna;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn ovlp(cur: (usize, usize), ext: (usize, usize), divergence: f32) -> Overlap {
        Overlap {
            cur: SeqId::forward_of(0),
            cur_begin: cur.0,
            cur_end: cur.1,
            cur_len: 10_000,
            ext: SeqId::forward_of(1),
            ext_begin: ext.0,
            ext_end: ext.1,
            ext_len: 10_000,
            divergence,
            score: 0,
        }
    }

    #[test]
    fn conflicts_resolve_independent_of_order() {
        let mut candidates = vec![
            ovlp((0, 2000), (0, 2000), 0.02),
            ovlp((100, 2100), (150, 2150), 0.01),
            ovlp((6000, 8000), (8000, 10000), 0.03),
            ovlp((6000, 8500), (7500, 10000), 0.03),
            ovlp((3000, 5000), (500, 2500), 0.0),
        ];

        let expected = resolve_conflicts(candidates.clone());
        // the less divergent alignment of a region wins, then the longer
        // one; an overlap sharing only its ext region is kept
        assert_eq!(expected.len(), 3);
        assert_eq!(expected[0].cur_begin, 3000);
        assert_eq!(expected[1].cur_begin, 100);
        assert_eq!(expected[2].cur_end, 8500);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            candidates.shuffle(&mut rng);
            assert_eq!(resolve_conflicts(candidates.clone()), expected);
        }
    }

    #[test]
    fn equal_overlaps_prefer_lower_sequence_ids() {
        let a = ovlp((0, 2000), (0, 2000), 0.01);
        let b = Overlap {
            ext: SeqId::forward_of(2),
            ..a
        };
        let c = Overlap {
            cur: SeqId::forward_of(1),
            ..b
        };
        assert_eq!(a.length(), b.length());
        assert_eq!(a.preference_cmp(&b), std::cmp::Ordering::Less);
        assert_eq!(b.preference_cmp(&a), std::cmp::Ordering::Greater);
        assert_eq!(b.preference_cmp(&c), std::cmp::Ordering::Less);

        let mut forward = vec![a, b, c];
        let mut backward = vec![c, b, a];
        forward.sort_by(|x, y| x.preference_cmp(y));
        backward.sort_by(|x, y| x.preference_cmp(y));
        assert_eq!(forward, vec![a, b, c]);
        assert_eq!(backward, forward);

        // same pair, same divergence and length: the lower coordinates win
        let early = ovlp((0, 2000), (0, 2000), 0.01);
        let late = ovlp((100, 2100), (100, 2100), 0.01);
        let kept = resolve_conflicts(vec![early, late]);
        assert_eq!(kept, vec![early]);
        assert_eq!(resolve_conflicts(vec![late, early]), kept);

        // different pairs never conflict
        let kept = resolve_conflicts(vec![c, b, a]);
        assert_eq!(kept, vec![a, b, c]);
    }

    #[test]
    fn detection_excludes_self_overlaps() {
        let mut rng = StdRng::seed_from_u64(21);
        let repeat = random_dna(&mut rng, 1500);

        let mut store = SequenceStore::new();
        // a single sequence with an internal tandem copy
        let mut seq = random_dna(&mut rng, 3000);
        seq.extend_from_slice(&repeat);
        seq.extend(random_dna(&mut rng, 3000));
        seq.extend_from_slice(&repeat);
        seq.extend(random_dna(&mut rng, 3000));
        store.add_sequence("tandem", &seq);

        let container = OverlapContainer::detect(&store, &Parameters::default());
        assert!(container.is_empty());

        let mut other = random_dna(&mut rng, 2000);
        other.extend_from_slice(&repeat);
        other.extend(random_dna(&mut rng, 2000));
        store.add_sequence("other", &other);

        let container = OverlapContainer::detect(&store, &Parameters::default());
        assert_eq!(container.len(), 2);
        assert!(container
            .canonical()
            .iter()
            .all(|o| o.cur.index() == 0 && o.ext.index() == 1 && o.length() >= 1500));
    }
}
