//! kmer extraction.
//!
//! A kmer value is the mixed radix number of its residue codes, so values lie in 0..Alphabet::SIZE^k
//! and index directly the database kmer table. Kmers containing a non encodable residue are skipped.

use std::marker::PhantomData;

use crate::alphabet::Alphabet;


/// number of distinct kmer values for the alphabet and word size
pub fn kmer_table_size<A : Alphabet>(word_size : usize) -> u64 {
    (A::SIZE as u64).pow(word_size as u32)
}


/// Iterates over (position, kmer value) of all valid kmers of a residue slice.
pub struct KmerIter<'a, A : Alphabet> {
    residues : &'a [u8],
    word_size : usize,
    table_size : u64,
    /// next residue to consume
    pos : usize,
    /// number of consecutive encodable residues accumulated in value
    nb_valid : usize,
    value : u64,
    _alphabet : PhantomData<A>,
}


impl <'a, A : Alphabet> KmerIter<'a, A> {
    pub fn new(residues : &'a [u8], word_size : usize) -> Self {
        assert!(word_size > 0, "word size must be positive");
        KmerIter{residues, word_size, table_size : kmer_table_size::<A>(word_size), pos : 0, nb_valid : 0, value : 0, _alphabet : PhantomData}
    }
} // end of impl KmerIter


impl <'a, A : Alphabet> Iterator for KmerIter<'a, A> {
    /// start position of kmer and its value
    type Item = (usize, u32);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.residues.len() {
            let residue = self.residues[self.pos];
            self.pos += 1;
            match A::encode(residue) {
                Some(code) => {
                    self.value = (self.value * A::SIZE as u64 + code as u64) % self.table_size;
                    self.nb_valid += 1;
                    if self.nb_valid >= self.word_size {
                        return Some((self.pos - self.word_size, self.value as u32));
                    }
                }
                None => {
                    self.nb_valid = 0;
                    self.value = 0;
                }
            }
        }
        None
    } // end of next
} // end of impl Iterator for KmerIter



// end of mod tests
