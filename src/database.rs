//! The reference database: an inverted index from kmer value to its occurrences.
//!
//! The index is built once in two passes over all reference residues:
//! - statistics : count occurrences of each kmer value to size the tables,
//! - indexing : store (sequence rank, position) of each occurrence.
//!
//! Occurrences of a kmer are stored contiguously, ordered by sequence rank then position, and
//! located with a table of offsets indexed directly by kmer value.
//! After initialization the database is never mutated and can be shared between threads (through an Arc)
//! without locking.

use std::marker::PhantomData;

use crate::alphabet::Alphabet;
use crate::errors::SearchError;
use crate::kmer::{KmerIter, kmer_table_size};
use crate::sequence::{Sequence, total_residues};
use crate::utils::progress::{ProgressObserver, ProgressStage};


/// an occurrence of a kmer in the database
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Occurrence {
    /// rank of sequence in the database
    pub seq_rank : u32,
    /// position of kmer in sequence
    pub pos : u32,
}


// progress is reported every PROGRESS_STEP residues
const PROGRESS_STEP : usize = 1 << 20;


pub struct Database<A : Alphabet> {
    word_size : usize,
    sequences : Vec<Sequence<A>>,
    /// occurrences of kmer k are in occurrences[offsets[k]..offsets[k+1]]
    offsets : Vec<u32>,
    occurrences : Vec<Occurrence>,
    initialized : bool,
    _alphabet : PhantomData<A>,
} // end of struct Database


impl <A : Alphabet> Database<A> {

    /// allocates an empty database with kmers of size word_size
    pub fn new(word_size : usize) -> Result<Self, SearchError> {
        let max = A::max_word_size();
        if word_size == 0 || word_size > max {
            log::error!("Database::new, invalid word size {} for {}", word_size, A::NAME);
            return Err(SearchError::InvalidWordSize{word_size, alphabet : A::NAME, max});
        }
        Ok(Database{word_size, sequences : Vec::new(), offsets : Vec::new(), occurrences : Vec::new(), initialized : false, _alphabet : PhantomData})
    }

    /// builds the index. Must be called once, progress is reported on stages StatsDatabase and IndexDatabase.
    pub fn initialize(&mut self, sequences : Vec<Sequence<A>>, observer : &dyn ProgressObserver) -> Result<(), SearchError> {
        if self.initialized {
            return Err(SearchError::AlreadyInitialized);
        }
        if sequences.len() > u32::MAX as usize || sequences.iter().any(|s| s.len() > u32::MAX as usize) {
            return Err(SearchError::InvalidParameter("too many or too long database sequences".to_string()));
        }
        let total = total_residues(&sequences);
        let table_size = kmer_table_size::<A>(self.word_size) as usize;
        log::info!("Database::initialize, nb sequences : {}, nb residues : {}, word size : {}, kmer table size : {}",
                sequences.len(), total, self.word_size, table_size);
        //
        // statistics : counts[k+1] gets number of occurrences of k
        //
        observer.activate(ProgressStage::StatsDatabase);
        let mut counts = vec![0u32; table_size + 1];
        let mut nb_kmers : u64 = 0;
        let mut done = 0;
        let mut next_report = PROGRESS_STEP;
        for seq in &sequences {
            for (_, kmer) in KmerIter::<A>::new(seq.get_residues(), self.word_size) {
                counts[kmer as usize + 1] += 1;
                nb_kmers += 1;
            }
            done += seq.len();
            if done >= next_report {
                observer.set(ProgressStage::StatsDatabase, done, total);
                next_report = done + PROGRESS_STEP;
            }
        }
        observer.set(ProgressStage::StatsDatabase, total, total);
        observer.finish(ProgressStage::StatsDatabase);
        if nb_kmers > u32::MAX as u64 {
            return Err(SearchError::InvalidParameter(format!("too many kmers in database : {}", nb_kmers)));
        }
        log::debug!("Database::initialize nb kmer occurrences : {}", nb_kmers);
        // prefix sums
        for k in 1..counts.len() {
            counts[k] += counts[k - 1];
        }
        let mut offsets = counts;
        //
        // indexing, we use a copy of offsets as insertion cursors
        //
        observer.activate(ProgressStage::IndexDatabase);
        let mut cursors = offsets[..table_size].to_vec();
        let mut occurrences = vec![Occurrence{seq_rank : 0, pos : 0}; nb_kmers as usize];
        done = 0;
        next_report = PROGRESS_STEP;
        for (rank, seq) in sequences.iter().enumerate() {
            for (pos, kmer) in KmerIter::<A>::new(seq.get_residues(), self.word_size) {
                let cursor = &mut cursors[kmer as usize];
                occurrences[*cursor as usize] = Occurrence{seq_rank : rank as u32, pos : pos as u32};
                *cursor += 1;
            }
            done += seq.len();
            if done >= next_report {
                observer.set(ProgressStage::IndexDatabase, done, total);
                next_report = done + PROGRESS_STEP;
            }
        }
        observer.set(ProgressStage::IndexDatabase, total, total);
        observer.finish(ProgressStage::IndexDatabase);
        offsets.shrink_to_fit();
        //
        self.sequences = sequences;
        self.offsets = offsets;
        self.occurrences = occurrences;
        self.initialized = true;
        //
        if let Some(usage) = memory_stats::memory_stats() {
            log::info!("Database indexed, physical memory used : {:.3} Gb", usage.physical_mem as f64 / 1.0e9);
        }
        Ok(())
    } // end of initialize


    /// ordered occurrences of a kmer value, empty if database is not initialized
    #[inline]
    pub fn occurrences(&self, kmer : u32) -> &[Occurrence] {
        let k = kmer as usize;
        if k + 1 >= self.offsets.len() {
            return &[];
        }
        &self.occurrences[self.offsets[k] as usize..self.offsets[k + 1] as usize]
    }

    pub fn get_word_size(&self) -> usize {
        self.word_size
    }

    pub fn get_sequence(&self, rank : usize) -> &Sequence<A> {
        &self.sequences[rank]
    }

    pub fn get_sequences(&self) -> &[Sequence<A>] {
        &self.sequences
    }

    /// number of sequences
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// total number of indexed kmer occurrences
    pub fn get_nb_kmers(&self) -> usize {
        self.occurrences.len()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

} // end of impl Database



// end of mod tests
