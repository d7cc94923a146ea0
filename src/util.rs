pub mod disjoint;

pub use self::disjoint::DisjointSets;

/// Nucleotide helpers shared by the sequence store, the k-mer index
/// and the edge sequences of the graph.
pub mod dna {

    const BASES: &[u8] = b"ACGTNacgtn";
    const COMPLEMENTS: &[u8] = b"TGCANtgcan";

    /// Complement of every byte; anything that is not a nucleotide
    /// maps to `N`. Filled in at compile time.
    const COMPLEMENT: [u8; 256] = {
        let mut table = [b'N'; 256];
        let mut i = 0;
        while i < BASES.len() {
            table[BASES[i] as usize] = COMPLEMENTS[i];
            i += 1;
        }
        table
    };

    /// 2-bit code of every byte, `4` marking bytes that are not `ACGT`
    /// in either case.
    const CODES: [u8; 256] = {
        let mut table = [4u8; 256];
        let mut i = 0;
        while i < 4 {
            table[BASES[i] as usize] = i as u8;
            table[BASES[i + 5] as usize] = i as u8;
            i += 1;
        }
        table
    };

    #[inline]
    pub const fn comp_base(base: u8) -> u8 {
        COMPLEMENT[base as usize]
    }

    /// Reverse complement of a strand.
    #[inline]
    pub fn rev_comp(seq: &[u8]) -> Vec<u8> {
        seq.iter().rev().map(|&b| comp_base(b)).collect()
    }

    /// 2-bit code of a nucleotide, `None` for `N` and anything else
    /// that cannot be part of a k-mer.
    #[inline]
    pub const fn encode_base(base: u8) -> Option<u64> {
        match CODES[base as usize] {
            4 => None,
            code => Some(code as u64),
        }
    }

}
