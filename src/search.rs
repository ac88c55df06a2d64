//! Seeded global search of a query against the database.
//!
//! Candidates are the database sequences sharing at least one kmer with the query. They are visited
//! by decreasing number of distinct shared kmers (ties by increasing rank in database), aligned, and
//! accepted when identity reaches min_identity.
//! Search of a query stops after max_accepts accepted hits or max_rejects consecutive rejected candidates.

use std::sync::Arc;

use crate::align::{Aligner, Alignment, GlobalAligner};
use crate::alphabet::Alphabet;
use crate::database::Database;
use crate::kmer::KmerIter;
use crate::sequence::Sequence;
use crate::utils::parameters::SearchParams;


/// An accepted database sequence for a query
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    /// rank of target in database
    pub target : usize,
    /// identity fraction in [0,1]
    pub identity : f32,
    /// number of distinct kmers shared with the query
    pub nb_shared_kmers : usize,
    pub alignment : Alignment,
}


/// hits of a query in discovery order
pub type HitList = Vec<Hit>;

/// a query with its hits, unit of output
pub type QueryWithHits<A> = (Sequence<A>, HitList);



/// Search engine, one by worker thread. It shares the database and owns its scratch buffers.
pub struct GlobalSearch<A : Alphabet, Al : Aligner<A> = GlobalAligner<A>> {
    database : Arc<Database<A>>,
    params : SearchParams,
    aligner : Al,
    /// query kmers, deduplicated
    kmers : Vec<u32>,
    /// shared kmer count by database sequence rank, all 0 between queries
    counts : Vec<u32>,
    /// ranks with a non null count
    candidates : Vec<u32>,
} // end of struct GlobalSearch


impl <A : Alphabet> GlobalSearch<A, GlobalAligner<A>> {
    /// a search with the default global aligner
    pub fn new(database : Arc<Database<A>>, params : &SearchParams) -> Self {
        let aligner = GlobalAligner::<A>::new(params.align);
        Self::with_aligner(database, params, aligner)
    }
}


impl <A : Alphabet, Al : Aligner<A>> GlobalSearch<A, Al> {

    pub fn with_aligner(database : Arc<Database<A>>, params : &SearchParams, aligner : Al) -> Self {
        let nb_seq = database.len();
        GlobalSearch{database, params : *params, aligner, kmers : Vec::new(), counts : vec![0; nb_seq], candidates : Vec::new()}
    }

    pub fn get_database(&self) -> &Database<A> {
        &self.database
    }

    pub fn get_params(&self) -> &SearchParams {
        &self.params
    }

    // fills self.candidates with sequences sharing kmers with query, sorted by decreasing count then rank
    fn collect_candidates(&mut self, query : &Sequence<A>) {
        self.kmers.clear();
        self.candidates.clear();
        self.kmers.extend(KmerIter::<A>::new(query.get_residues(), self.database.get_word_size()).map(|(_, kmer)| kmer));
        self.kmers.sort_unstable();
        self.kmers.dedup();
        //
        for kmer in &self.kmers {
            let mut last_rank = u32::MAX;
            // occurrences are sorted by rank, we count a sequence once by kmer
            for occ in self.database.occurrences(*kmer) {
                if occ.seq_rank == last_rank {
                    continue;
                }
                last_rank = occ.seq_rank;
                let count = &mut self.counts[occ.seq_rank as usize];
                if *count == 0 {
                    self.candidates.push(occ.seq_rank);
                }
                *count += 1;
            }
        }
        let counts = &self.counts;
        self.candidates.sort_unstable_by(|a, b| counts[*b as usize].cmp(&counts[*a as usize]).then(a.cmp(b)));
    } // end of collect_candidates


    /// returns accepted hits of query, in discovery order
    pub fn query(&mut self, query : &Sequence<A>) -> HitList {
        let mut hits = HitList::new();
        if query.is_empty() || self.database.is_empty() {
            return hits;
        }
        self.collect_candidates(query);
        log::trace!("query {} nb candidates : {}", query.get_id(), self.candidates.len());
        //
        let mut nb_rejects = 0;
        let min_identity = self.params.min_identity;
        for rank in self.candidates.iter() {
            let rank = *rank as usize;
            let target = self.database.get_sequence(rank);
            let accepted = self.aligner.align(query.get_residues(), target.get_residues(), min_identity)
                    .map(|alignment| (alignment.identity(), alignment))
                    .filter(|(identity, _)| *identity >= min_identity);
            match accepted {
                Some((identity, alignment)) => {
                    hits.push(Hit{target : rank, identity, nb_shared_kmers : self.counts[rank] as usize, alignment});
                    nb_rejects = 0;
                    if hits.len() >= self.params.max_accepts {
                        break;
                    }
                }
                None => {
                    nb_rejects += 1;
                    if nb_rejects >= self.params.max_rejects {
                        break;
                    }
                }
            }
        }
        // reset counters for next query
        for rank in &self.candidates {
            self.counts[*rank as usize] = 0;
        }
        hits
    } // end of query

} // end of impl GlobalSearch



#[cfg(test)]
mod tests {

    use super::*;
    use crate::alphabet::Dna;
    use crate::utils::progress::NoProgress;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn dna(id : &str, seq : &str) -> Sequence<Dna> {
        Sequence::new(id, seq.as_bytes())
    }

    fn build_db(word_size : usize, seqs : Vec<Sequence<Dna>>) -> Arc<Database<Dna>> {
        let mut db = Database::<Dna>::new(word_size).unwrap();
        db.initialize(seqs, &NoProgress).unwrap();
        Arc::new(db)
    }

    // counts calls to the global aligner
    struct ScriptedAligner {
        nb_calls : usize,
        inner : GlobalAligner<Dna>,
    }

    impl Aligner<Dna> for ScriptedAligner {
        fn align(&mut self, query : &[u8], target : &[u8], min_identity : f32) -> Option<Alignment> {
            self.nb_calls += 1;
            self.inner.align(query, target, min_identity)
        }
    }

    #[test]
    fn test_identical_hit() {
        log_init_test();
        let db = build_db(8, vec![dna("r1", "ACGTACGTACGT")]);
        let mut search = GlobalSearch::new(db, &SearchParams::default());
        let hits = search.query(&dna("q1", "ACGTACGTACGT"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, 0);
        assert_eq!(hits[0].identity, 1.);
        assert_eq!(search.get_database().get_sequence(hits[0].target).get_id(), "r1");
    }

    #[test]
    fn test_no_shared_seed() {
        let db = build_db(8, vec![dna("r1", "AAAAAAAA")]);
        let mut search = GlobalSearch::new(db, &SearchParams::default());
        assert!(search.query(&dna("q1", "TTTTTTTT")).is_empty());
        // query shorter than word size
        assert!(search.query(&dna("q2", "AAAA")).is_empty());
        assert!(search.query(&dna("q3", "")).is_empty());
    }

    #[test]
    fn test_empty_database() {
        let db = build_db(8, Vec::new());
        let mut search = GlobalSearch::new(db, &SearchParams::default());
        assert!(search.query(&dna("q1", "ACGTACGTACGT")).is_empty());
    }

    #[test]
    fn test_max_accepts_first_discovered() {
        // r1 shares fewer kmers than r2 but both are above threshold, r2 is visited first
        let query = "ACGTTGCAACGGTACCATGGTTAACCGGTTAA";
        let r1 = "ACGTTGCAACGGTACCATGGTTAACCGGTTAT"; // 1 mismatch at end
        let r2 = query;
        let db = build_db(8, vec![dna("r1", r1), dna("r2", r2)]);
        let mut search = GlobalSearch::new(db.clone(), &SearchParams::new(1, 16, 0.75));
        let hits = search.query(&dna("q", query));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].target, 1);
        // with 2 accepts we get both, in visiting order
        let mut search = GlobalSearch::new(db, &SearchParams::new(2, 16, 0.75));
        let hits = search.query(&dna("q", query));
        let targets : Vec<usize> = hits.iter().map(|h| h.target).collect();
        assert_eq!(targets, vec![1, 0]);
        assert!(hits[0].nb_shared_kmers > hits[1].nb_shared_kmers);
    }

    #[test]
    fn test_tie_broken_by_rank() {
        let seq = "ACGTTGCAACGGTACCATGG";
        let db = build_db(8, vec![dna("r1", seq), dna("r2", seq), dna("r3", seq)]);
        let mut search = GlobalSearch::new(db, &SearchParams::new(3, 16, 0.75));
        let hits = search.query(&dna("q", seq));
        let targets : Vec<usize> = hits.iter().map(|h| h.target).collect();
        assert_eq!(targets, vec![0, 1, 2]);
    }

    #[test]
    fn test_max_rejects_bound() {
        // every target shares a kmer with query but is far too long to reach identity
        let core = "ACGTTGCAACGG";
        let mut seqs = Vec::new();
        for i in 0..10 {
            seqs.push(dna(&format!("r{}", i), &format!("{}{}", core, "T".repeat(40 + i))));
        }
        let db = build_db(8, seqs);
        let aligner = ScriptedAligner{nb_calls : 0, inner : GlobalAligner::new(Default::default())};
        let mut search = GlobalSearch::with_aligner(db, &SearchParams::new(1, 3, 0.75), aligner);
        let hits = search.query(&dna("q", core));
        assert!(hits.is_empty());
        assert_eq!(search.aligner.nb_calls, 3);
    }

    #[test]
    fn test_reject_counter_reset_on_accept() {
        let query = "ACGTTGCAACGGTACCATGG";
        // l1 and l2 share more kmers than ok but are too long, ok is accepted, l3 shares less and is rejected
        let long = format!("{}{}", query, "G".repeat(60));
        let db = build_db(8, vec![dna("l1", &long), dna("l2", &long), dna("ok", &query[..18]), dna("l3", &format!("{}{}", &query[..10], "C".repeat(60)))]);
        let aligner = ScriptedAligner{nb_calls : 0, inner : GlobalAligner::new(Default::default())};
        let mut search = GlobalSearch::with_aligner(db, &SearchParams::new(5, 2, 0.75), aligner);
        let hits = search.query(&dna("q", query));
        // l1 l2 rejected, stop at 2 consecutive rejects happens before ok is reached
        assert!(hits.is_empty());
        assert_eq!(search.aligner.nb_calls, 2);
        //
        let aligner = ScriptedAligner{nb_calls : 0, inner : GlobalAligner::new(Default::default())};
        let mut search = GlobalSearch::with_aligner(search.database.clone(), &SearchParams::new(5, 3, 0.75), aligner);
        let hits = search.query(&dna("q", query));
        assert_eq!(hits.len(), 1);
        // l1, l2 rejected, ok accepted (reset), l3 rejected, end of candidates
        assert_eq!(search.aligner.nb_calls, 4);
    }

    #[test]
    fn test_counters_reset_between_queries() {
        let db = build_db(8, vec![dna("r1", "ACGTACGTACGT")]);
        let mut search = GlobalSearch::new(db, &SearchParams::default());
        let h1 = search.query(&dna("q1", "ACGTACGTACGT"));
        let h2 = search.query(&dna("q1", "ACGTACGTACGT"));
        assert_eq!(h1, h2);
        assert!(search.counts.iter().all(|c| *c == 0));
    }

    // query and 9 variants with 0..9 substitutions in their tail
    fn graded_database() -> (Sequence<Dna>, Arc<Database<Dna>>) {
        let query = "ACGTTGCAACGGTACCATGGTTAACCGGTTAAGCTAGCTA";
        let mut seqs = Vec::new();
        for nb_subst in 0..9 {
            let mut residues = query.as_bytes().to_vec();
            for pos in query.len() - nb_subst..query.len() {
                residues[pos] = match residues[pos] { b'A' => b'C', b'C' => b'G', b'G' => b'T', _ => b'A' };
            }
            seqs.push(Sequence::new(&format!("v{}", nb_subst), &residues));
        }
        (dna("q", query), build_db(8, seqs))
    }

    #[test]
    fn test_threshold_monotonicity() {
        log_init_test();
        let (query, db) = graded_database();
        // raising min_identity never grows the hit list
        let mut last = usize::MAX;
        for step in 0..=10 {
            let min_identity = (50 + 5 * step) as f32 / 100.;
            let mut search = GlobalSearch::new(db.clone(), &SearchParams::new(20, 16, min_identity));
            let nb_hits = search.query(&query).len();
            assert!(nb_hits <= last, "min_identity {} gives {} hits, more than {}", min_identity, nb_hits, last);
            last = nb_hits;
        }
        assert_eq!(last, 1);
        // raising max_accepts never shrinks it
        let mut last = 0;
        for max_accepts in 1..=12 {
            let mut search = GlobalSearch::new(db.clone(), &SearchParams::new(max_accepts, 16, 0.5));
            let nb_hits = search.query(&query).len();
            assert!(nb_hits >= last, "max_accepts {} gives {} hits, less than {}", max_accepts, nb_hits, last);
            assert!(nb_hits <= max_accepts);
            last = nb_hits;
        }
        assert_eq!(last, 9);
    }

    #[test]
    fn test_concurrent_queries_match_sequential() {
        log_init_test();
        let refs = ["ACGTTGCAACGGTACCATGGTTAACC", "GGATCCATGCATGCAAGCTTGGCACT", "TTGACAGCTAGCTCAGTCCTAGGTAT", "ACGTTGCAACGGTACCATGGTTAACG"];
        let db = build_db(8, refs.iter().enumerate().map(|(i, s)| dna(&format!("r{}", i), s)).collect());
        let queries : Vec<Sequence<Dna>> = refs.iter().enumerate().map(|(i, s)| dna(&format!("q{}", i), s)).collect();
        let params = SearchParams::new(2, 4, 0.75);
        let mut search = GlobalSearch::new(db.clone(), &params);
        let sequential : Vec<HitList> = queries.iter().map(|q| search.query(q)).collect();
        //
        std::thread::scope(|scope| {
            let handles : Vec<_> = (0..4).map(|_| {
                let db = db.clone();
                let queries = &queries;
                scope.spawn(move || {
                    let mut search = GlobalSearch::new(db, &params);
                    queries.iter().map(|q| search.query(q)).collect::<Vec<HitList>>()
                })
            }).collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), sequential);
            }
        });
    }

} // end of mod tests
