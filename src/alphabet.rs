//! Residue alphabets.
//!
//! An alphabet is a zero sized type selected at compile time. It gives the default kmer (seed) size,
//! the encoding of residues used to build kmer values, the rule used to count matching columns
//! and the substitution score used by the aligner.
//!
//! Database and search structures are generic over the alphabet so the per residue code is monomorphized.

use std::fmt::Debug;

use crate::utils::parameters::AlignParams;

/// maximal number of entries of the direct kmer table, so max word size is 14 for Dna and 6 for Protein
pub const MAX_KMER_TABLE_SIZE : u64 = 1 << 28;

/// code returned by encoding tables for non encodable residues
pub(crate) const NOT_ENCODABLE : u8 = 0xFF;

pub trait Alphabet : Copy + Clone + Debug + Default + Send + Sync + 'static {
    /// name used in logs and errors
    const NAME : &'static str;
    /// default kmer size used in seeding
    const DEFAULT_WORD_SIZE : usize;
    /// number of residues that can enter a kmer
    const SIZE : usize;

    /// normalize a residue as read from a file (case, synonyms)
    fn normalize(residue : u8) -> u8;

    /// code in 0..SIZE of an (already normalized) residue, None if residue cannot enter a kmer
    fn encode(residue : u8) -> Option<u8>;

    /// true if residues are counted as a match in identity computation
    fn matches(a : u8, b : u8) -> bool;

    /// substitution score
    fn score(a : u8, b : u8, params : &AlignParams) -> i32;

    /// largest word size such that SIZE^word_size fits in the direct kmer table
    fn max_word_size() -> usize {
        let mut k = 0;
        let mut size : u64 = 1;
        while size * (Self::SIZE as u64) <= MAX_KMER_TABLE_SIZE {
            size *= Self::SIZE as u64;
            k += 1;
        }
        k
    }
} // end of trait Alphabet


//=====================================================================================

const fn dna_encoding() -> [u8; 256] {
    let mut table = [NOT_ENCODABLE; 256];
    table[b'A' as usize] = 0;
    table[b'C' as usize] = 1;
    table[b'G' as usize] = 2;
    table[b'T' as usize] = 3;
    table
}

// iupac codes as bit sets of A=1, C=2, G=4, T=8
const fn iupac_masks() -> [u8; 256] {
    let mut table = [0u8; 256];
    table[b'A' as usize] = 1;
    table[b'C' as usize] = 2;
    table[b'G' as usize] = 4;
    table[b'T' as usize] = 8;
    table[b'R' as usize] = 1 | 4;
    table[b'Y' as usize] = 2 | 8;
    table[b'S' as usize] = 2 | 4;
    table[b'W' as usize] = 1 | 8;
    table[b'K' as usize] = 4 | 8;
    table[b'M' as usize] = 1 | 2;
    table[b'B' as usize] = 2 | 4 | 8;
    table[b'D' as usize] = 1 | 4 | 8;
    table[b'H' as usize] = 1 | 2 | 8;
    table[b'V' as usize] = 1 | 2 | 4;
    table[b'N' as usize] = 15;
    table
}

static DNA_ENCODING : [u8; 256] = dna_encoding();
static IUPAC_MASKS : [u8; 256] = iupac_masks();


/// Nucleotides. Kmers are built on ACGT, ambiguity codes (N, R, Y ...) break kmers
/// but match their bases when counting identity.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Dna;

impl Alphabet for Dna {
    const NAME : &'static str = "dna";
    const DEFAULT_WORD_SIZE : usize = 8;
    const SIZE : usize = 4;

    #[inline]
    fn normalize(residue : u8) -> u8 {
        match residue.to_ascii_uppercase() {
            b'U' => b'T',
            r => r,
        }
    }

    #[inline]
    fn encode(residue : u8) -> Option<u8> {
        match DNA_ENCODING[residue as usize] {
            NOT_ENCODABLE => None,
            code => Some(code),
        }
    }

    #[inline]
    fn matches(a : u8, b : u8) -> bool {
        IUPAC_MASKS[a as usize] & IUPAC_MASKS[b as usize] != 0
    }

    #[inline]
    fn score(a : u8, b : u8, params : &AlignParams) -> i32 {
        if Self::matches(a, b) {
            params.match_score
        }
        else {
            params.mismatch_score
        }
    }
} // end of impl Alphabet for Dna


//=====================================================================================

const AMINO_ACIDS : &[u8; 20] = b"ARNDCQEGHILKMFPSTWYV";

const fn protein_encoding() -> [u8; 256] {
    let mut table = [NOT_ENCODABLE; 256];
    let mut i = 0;
    while i < AMINO_ACIDS.len() {
        table[AMINO_ACIDS[i] as usize] = i as u8;
        i += 1;
    }
    table
}

static PROTEIN_ENCODING : [u8; 256] = protein_encoding();

// rows and columns in the order of AMINO_ACIDS
#[rustfmt::skip]
static BLOSUM62 : [[i8; 20]; 20] = [
    //A   R   N   D   C   Q   E   G   H   I   L   K   M   F   P   S   T   W   Y   V
    [ 4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0], // A
    [-1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3], // R
    [-2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3], // N
    [-2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3], // D
    [ 0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1], // C
    [-1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2], // Q
    [-1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2], // E
    [ 0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3], // G
    [-2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3], // H
    [-1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3], // I
    [-1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1], // L
    [-1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2], // K
    [-1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1], // M
    [-2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1], // F
    [-1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2], // P
    [ 1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2], // S
    [ 0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0], // T
    [-3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3], // W
    [-2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1], // Y
    [ 0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4], // V
];

/// score used when one residue is not one of the 20 standard amino acids (X, B, Z, *)
const BLOSUM62_UNKNOWN : i32 = -1;


/// Amino acids. Kmers are built on the 20 standard residues, X matches anything in identity computation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Protein;

impl Alphabet for Protein {
    const NAME : &'static str = "protein";
    const DEFAULT_WORD_SIZE : usize = 5;
    const SIZE : usize = 20;

    #[inline]
    fn normalize(residue : u8) -> u8 {
        residue.to_ascii_uppercase()
    }

    #[inline]
    fn encode(residue : u8) -> Option<u8> {
        match PROTEIN_ENCODING[residue as usize] {
            NOT_ENCODABLE => None,
            code => Some(code),
        }
    }

    #[inline]
    fn matches(a : u8, b : u8) -> bool {
        a == b || a == b'X' || b == b'X'
    }

    #[inline]
    fn score(a : u8, b : u8, _params : &AlignParams) -> i32 {
        match (Self::encode(a), Self::encode(b)) {
            (Some(i), Some(j)) => BLOSUM62[i as usize][j as usize] as i32,
            _ => BLOSUM62_UNKNOWN,
        }
    }
} // end of impl Alphabet for Protein


//=====================================================================================

// end of mod tests
