/*!
Identifier newtypes shared by every component.

* [`SeqId`] names one strand of a sequence in a
  [`SequenceStore`](crate::sequence::SequenceStore), packed as a
  single `u64` with the strand in the lowest bit.
* [`NodeId`] and [`EdgeId`] are stable indices into the
  [`RepeatGraph`](crate::graph::RepeatGraph) arena. Ids are never
  reused, so an id held by a stale alignment can always be checked
  against the graph instead of dereferenced.
*/

use std::fmt;

/// A sequence strand, packed as `(index << 1) | is_reverse`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Hash, Eq, Ord)]
#[repr(transparent)]
pub struct SeqId(pub u64);

impl SeqId {
    #[inline]
    pub fn pack(index: usize, is_reverse: bool) -> SeqId {
        let uint = index as u64;
        if uint < (0x1 << 63) {
            SeqId((uint << 1) | is_reverse as u64)
        } else {
            panic!("Tried to create a sequence id with an index that filled 64 bits")
        }
    }

    /// Forward strand of the sequence at `index`.
    #[inline]
    pub fn forward_of(index: usize) -> SeqId {
        SeqId::pack(index, false)
    }

    /// Index of the sequence record, shared by both strands.
    #[inline]
    pub fn index(self) -> usize {
        (self.0 >> 1) as usize
    }

    #[inline]
    pub fn is_reverse(self) -> bool {
        self.0 & 1 != 0
    }

    /// The reverse complement strand.
    #[inline]
    pub fn flip(self) -> Self {
        SeqId(self.0 ^ 1)
    }
}

impl fmt::Display for SeqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_reverse() { '-' } else { '+' };
        write!(f, "{}{}", sign, self.index())
    }
}

/// Junction in the repeat graph.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(num: usize) -> Self {
        NodeId(num as u64)
    }
}

/// Directed edge of the repeat graph.
///
/// Edge ids are handed out in complementary pairs `(2i, 2i + 1)`, the
/// even id being the forward representative of the pair. The pairing
/// itself is stored on the edge, since a self-complementary edge is
/// its own complement and leaves the odd id unused.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EdgeId(pub u64);

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn pair_index(self) -> u64 {
        self.0 >> 1
    }

    #[inline]
    pub fn is_forward(self) -> bool {
        self.0 & 1 == 0
    }

    /// The other id of the allocation pair.
    #[inline]
    pub fn paired(self) -> Self {
        EdgeId(self.0 ^ 1)
    }

    /// Signed, one-based id used in the graph exports: `+n` for the
    /// forward edge of pair `n - 1`, `-n` for its complement.
    #[inline]
    pub fn signed(self) -> i64 {
        let n = self.pair_index() as i64 + 1;
        if self.is_forward() {
            n
        } else {
            -n
        }
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.signed())
    }
}

/// Side of a node or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SeqId::pack is an isomorphism; SeqId <=> (u63, bool)
    #[test]
    fn seq_id_is_isomorphism() {
        let u: usize = 597283742;
        let h = SeqId::pack(u, true);
        assert_eq!(h.index(), u);
        assert!(h.is_reverse());
        assert_eq!(h.flip().index(), u);
        assert!(!h.flip().is_reverse());
        assert_eq!(h.flip().flip(), h);
    }

    #[test]
    #[should_panic]
    fn seq_id_pack_panic() {
        SeqId::pack(usize::MAX, true);
    }

    #[test]
    fn edge_id_signs() {
        assert_eq!(EdgeId(0).signed(), 1);
        assert_eq!(EdgeId(1).signed(), -1);
        assert_eq!(EdgeId(6).signed(), 4);
        assert_eq!(EdgeId(7).paired(), EdgeId(6));
        assert_eq!(format!("{}", EdgeId(7)), "-4");
        assert_eq!(format!("{}", EdgeId(6)), "+4");
    }
}
