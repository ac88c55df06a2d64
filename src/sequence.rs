//! Sequence records as read from fasta files.
//!
//! A sequence owns its id and its residues, normalized for its alphabet at construction.
//! Query sequences travel by batches through the pipeline, database sequences are owned by the Database.

use std::marker::PhantomData;

use crate::alphabet::Alphabet;


/// default number of queries sent in one work item to search workers
pub const DEFAULT_QUERY_BATCH_SIZE : usize = 64;


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence<A : Alphabet> {
    /// fasta id, (header up to first white space)
    id : String,
    /// normalized residues
    residues : Vec<u8>,
    _alphabet : PhantomData<A>,
} // end of struct Sequence


impl <A : Alphabet> Sequence<A> {
    /// residues are normalized for the alphabet (upper case, U -> T for Dna). White spaces are dropped.
    pub fn new(id : &str, residues : &[u8]) -> Self {
        let residues = residues.iter()
                .filter(|r| !r.is_ascii_whitespace())
                .map(|r| A::normalize(*r))
                .collect();
        Sequence{ id : id.to_string(), residues, _alphabet : PhantomData}
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_residues(&self) -> &[u8] {
        &self.residues
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }
} // end of impl Sequence


/// the unit of work handed to the search stage
pub type SequenceBatch<A> = Vec<Sequence<A>>;


/// total number of residues of a collection, used for progress reporting during indexing
pub fn total_residues<A : Alphabet>(sequences : &[Sequence<A>]) -> usize {
    sequences.iter().fold(0, |acc, s| acc + s.len())
}


//=====================================================================================


#[cfg(test)]
mod tests {

    use super::*;
    use crate::alphabet::{Dna, Protein};

    #[test]
    fn test_sequence_normalization() {
        let seq = Sequence::<Dna>::new("s1", b"acgu\nNNa");
        assert_eq!(seq.get_id(), "s1");
        assert_eq!(seq.get_residues(), b"ACGTNNA");
        assert_eq!(seq.len(), 7);
        //
        let prot = Sequence::<Protein>::new("p1", b"mkv u");
        assert_eq!(prot.get_residues(), b"MKVU");
    }

    #[test]
    fn test_total_residues() {
        let seqs = vec![Sequence::<Dna>::new("a", b"ACGT"), Sequence::<Dna>::new("b", b"")];
        assert_eq!(total_residues(&seqs), 4);
        assert!(seqs[1].is_empty());
    }

} // end of mod tests
