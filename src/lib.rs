//! Seeded global search of dna or protein sequences against a kmer indexed database.
//!
//! Database sequences are indexed by their kmers (seeds). For each query, database sequences sharing
//! kmers with it are visited by decreasing number of shared kmers, globally aligned, and accepted as hits
//! when identity reaches a threshold. Queries are processed by batches on a pool of threads and hits are
//! written as tabular or csv records.

pub mod errors;
pub mod alphabet;
pub mod sequence;
pub mod kmer;
pub mod database;
pub mod align;
pub mod search;
pub mod workerqueue;
pub mod hitwriter;
pub mod pipeline;
pub mod utils;

pub use errors::SearchError;
pub use alphabet::{Alphabet, Dna, Protein};
pub use sequence::Sequence;
pub use database::Database;
pub use search::{GlobalSearch, Hit, HitList};
pub use hitwriter::{HitWriter, OutputFormat};
pub use pipeline::{RunOptions, RunSummary, SeqType, run_search, search_files, search_collections};
