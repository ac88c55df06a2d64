//! The search pipeline.
//!
//! The database is indexed once, then query batches are sent to a pool of search workers, each owning
//! its GlobalSearch on the shared database. Queries with hits are forwarded by batches to a writer
//! pool with one worker owning the output.
//!
//! Output order is the order in which batches complete, not the order of queries in input.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use cpu_time::ProcessTime;
use strum_macros::{Display, EnumString};

use crate::alphabet::{Alphabet, Dna, Protein};
use crate::database::Database;
use crate::hitwriter::{HitSink, OutputFormat, open_hit_writer};
use crate::search::{GlobalSearch, QueryWithHits};
use crate::sequence::{Sequence, SequenceBatch, DEFAULT_QUERY_BATCH_SIZE};
use crate::utils::files::{FastxSource, SequenceSource, VecSource, read_all};
use crate::utils::parameters::SearchParams;
use crate::utils::progress::{ProgressObserver, ProgressStage};
use crate::workerqueue::{QueueHandle, Worker, WorkerQueue};


/// type of sequences to process
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SeqType {
    #[strum(serialize = "dna")]
    Dna,
    #[strum(serialize = "protein", serialize = "aa")]
    Protein,
}


/// everything needed to run a search besides inputs and output
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub params : SearchParams,
    /// number of search threads, all cpus if None
    pub threads : Option<usize>,
    /// number of queries by work item
    pub batch_size : usize,
    /// capacity of queues, twice the number of workers if None
    pub queue_capacity : Option<usize>,
    /// output format when it cannot be detected from output file name
    pub default_format : OutputFormat,
    pub seq_type : SeqType,
}


impl Default for RunOptions {
    fn default() -> Self {
        RunOptions{params : SearchParams::default(), threads : None, batch_size : DEFAULT_QUERY_BATCH_SIZE, queue_capacity : None,
            default_format : OutputFormat::Tabular, seq_type : SeqType::Dna}
    }
}


#[derive(Clone, Debug)]
pub struct RunSummary {
    pub nb_database_sequences : usize,
    pub nb_queries : usize,
    pub nb_queries_with_hits : usize,
    pub nb_hits : usize,
    pub elapsed : Duration,
    pub cpu_time : Duration,
}


#[derive(Default)]
struct RunCounters {
    nb_queries_with_hits : AtomicUsize,
    nb_hits : AtomicUsize,
}


//=====================================================================================


/// search stage unit : searches a batch of queries and forwards queries with hits to the writer
pub struct SearchWorker<A : Alphabet> {
    search : GlobalSearch<A>,
    writer : QueueHandle<Vec<QueryWithHits<A>>>,
}


impl <A : Alphabet> SearchWorker<A> {
    pub fn new(search : GlobalSearch<A>, writer : QueueHandle<Vec<QueryWithHits<A>>>) -> Self {
        SearchWorker{search, writer}
    }
}


impl <A : Alphabet> Worker for SearchWorker<A> {
    type Item = SequenceBatch<A>;

    fn process(&mut self, queries : SequenceBatch<A>) -> anyhow::Result<()> {
        let mut with_hits = Vec::<QueryWithHits<A>>::new();
        for query in queries {
            let hits = self.search.query(&query);
            if hits.is_empty() {
                continue;
            }
            with_hits.push((query, hits));
        }
        if !with_hits.is_empty() {
            log::trace!("SearchWorker forwarding nb queries with hits : {}", with_hits.len());
            self.writer.enqueue(with_hits)?;
        }
        Ok(())
    }

    fn item_count(queries : &SequenceBatch<A>) -> usize {
        queries.len()
    }
} // end of impl Worker for SearchWorker



/// write stage unit, owns the output
pub struct WriterWorker<A : Alphabet, S : HitSink<A>> {
    sink : S,
    counters : Arc<RunCounters>,
    _alphabet : std::marker::PhantomData<A>,
}


impl <A : Alphabet, S : HitSink<A> + 'static> Worker for WriterWorker<A, S> {
    type Item = Vec<QueryWithHits<A>>;

    fn process(&mut self, batch : Vec<QueryWithHits<A>>) -> anyhow::Result<()> {
        self.sink.write(&batch)?;
        self.counters.nb_queries_with_hits.fetch_add(batch.len(), Ordering::Relaxed);
        self.counters.nb_hits.fetch_add(Self::item_count(&batch), Ordering::Relaxed);
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        self.sink.commit()?;
        Ok(())
    }

    fn item_count(batch : &Vec<QueryWithHits<A>>) -> usize {
        batch.iter().fold(0, |acc, (_, hits)| acc + hits.len())
    }
} // end of impl Worker for WriterWorker


//=====================================================================================


/// Runs a search of all queries of `queries` against `database_sequences`.
/// The sink is built by `make_sink` once the database is indexed, before any query is read.
pub fn run_search<A, Src, S, F>(database_sequences : Vec<Sequence<A>>, queries : &mut Src, make_sink : F,
                    options : &RunOptions, observer : Arc<dyn ProgressObserver>) -> anyhow::Result<RunSummary>
        where A : Alphabet, Src : SequenceSource<A>, S : HitSink<A> + 'static,
              F : FnMut(Arc<Database<A>>) -> anyhow::Result<S> {
    //
    let start_t = SystemTime::now();
    let cpu_start = ProcessTime::now();
    options.params.check()?;
    if options.batch_size == 0 {
        anyhow::bail!("query batch size must be positive");
    }
    let params = options.params;
    //
    // index database, before any search worker starts
    //
    let word_size = params.get_word_size(A::DEFAULT_WORD_SIZE);
    log::info!("run_search {} mode, word size : {}, max accepts : {}, max rejects : {}, min identity : {}",
            A::NAME, word_size, params.max_accepts, params.max_rejects, params.min_identity);
    let mut database = Database::<A>::new(word_size)?;
    database.initialize(database_sequences, observer.as_ref())?;
    let database = Arc::new(database);
    let nb_database_sequences = database.len();
    //
    // writer first, it must outlive search workers
    //
    let counters = Arc::new(RunCounters::default());
    let mut make_sink = make_sink;
    let capacity = options.queue_capacity.unwrap_or(2 * options.threads.filter(|n| *n > 0).unwrap_or_else(num_cpus::get));
    let writer = WorkerQueue::with_options("writer", Some(1), capacity, |_| {
        Ok(WriterWorker{sink : make_sink(database.clone())?, counters : counters.clone(), _alphabet : std::marker::PhantomData})
    })?;
    let write_observer = observer.clone();
    writer.on_processed(move |processed, enqueued| write_observer.set(ProgressStage::WriteHits, processed, enqueued));
    //
    let searcher = WorkerQueue::with_options("search", options.threads, capacity, |_| {
        Ok(SearchWorker::new(GlobalSearch::new(database.clone(), &params), writer.handle()))
    })?;
    let search_observer = observer.clone();
    searcher.on_processed(move |processed, enqueued| search_observer.set(ProgressStage::SearchDatabase, processed, enqueued));
    //
    // read and send queries
    //
    observer.activate(ProgressStage::ReadQueries);
    let mut nb_queries = 0;
    while !queries.is_eof() {
        let mut batch = SequenceBatch::<A>::with_capacity(options.batch_size);
        let nb_read = queries.read_batch(options.batch_size, &mut batch)?;
        observer.set(ProgressStage::ReadQueries, queries.bytes_read(), queries.bytes_total());
        if nb_read == 0 {
            break;
        }
        nb_queries += nb_read;
        if searcher.enqueue(batch).is_err() {
            log::error!("search queue failed, stopping query reading");
            break;
        }
    }
    observer.finish(ProgressStage::ReadQueries);
    log::info!("run_search nb queries sent : {}", nb_queries);
    //
    // drain search then writer
    //
    observer.activate(ProgressStage::SearchDatabase);
    if let Err(search_error) = searcher.wait_till_done() {
        // a failed writer makes forwarding search workers fail, its error is the cause to report
        if let Err(write_error) = writer.wait_till_done() {
            log::error!("search stopped by writer failure : {:#}", write_error);
            return Err(write_error);
        }
        return Err(search_error);
    }
    searcher.shutdown()?;
    observer.finish(ProgressStage::SearchDatabase);
    //
    observer.activate(ProgressStage::WriteHits);
    writer.wait_till_done()?;
    writer.shutdown()?;
    observer.finish(ProgressStage::WriteHits);
    //
    let summary = RunSummary{nb_database_sequences, nb_queries,
        nb_queries_with_hits : counters.nb_queries_with_hits.load(Ordering::Relaxed),
        nb_hits : counters.nb_hits.load(Ordering::Relaxed),
        elapsed : start_t.elapsed().unwrap_or_default(), cpu_time : cpu_start.elapsed()};
    log::info!("run_search done, nb queries : {}, with hits : {}, nb hits : {}, system time(s) : {:.3}, cpu time(s) : {:.3}",
            summary.nb_queries, summary.nb_queries_with_hits, summary.nb_hits, summary.elapsed.as_secs_f32(), summary.cpu_time.as_secs_f32());
    Ok(summary)
} // end of run_search



fn search_files_typed<A : Alphabet>(query_path : &Path, database_path : &Path, output_path : &Path, options : &RunOptions,
                    observer : Arc<dyn ProgressObserver>) -> anyhow::Result<RunSummary> {
    let mut db_source = FastxSource::<A>::from_path(database_path)?;
    let database_sequences = read_all(&mut db_source, ProgressStage::ReadDatabase, observer.as_ref())?;
    log::info!("read nb database sequences : {}", database_sequences.len());
    let mut query_source = FastxSource::<A>::from_path(query_path)?;
    let default_format = options.default_format;
    run_search(database_sequences, &mut query_source, |database| Ok(open_hit_writer(output_path, default_format, database)?), options, observer)
}


/// searches queries of a fasta/fastq file against a database fasta/fastq file, writes hits in output_path
pub fn search_files(query_path : &Path, database_path : &Path, output_path : &Path, options : &RunOptions,
                    observer : Arc<dyn ProgressObserver>) -> anyhow::Result<RunSummary> {
    match options.seq_type {
        SeqType::Dna => search_files_typed::<Dna>(query_path, database_path, output_path, options, observer),
        SeqType::Protein => search_files_typed::<Protein>(query_path, database_path, output_path, options, observer),
    }
} // end of search_files


/// searches in memory (id, sequence) collections of nucleotides, writes hits in output_path
pub fn search_collections<S1, T1, S2, T2>(queries : Vec<(S1, T1)>, database : Vec<(S2, T2)>, output_path : &Path,
                    max_accepts : usize, max_rejects : usize, min_identity : f32,
                    observer : Arc<dyn ProgressObserver>) -> anyhow::Result<RunSummary>
        where S1 : AsRef<str>, T1 : AsRef<[u8]>, S2 : AsRef<str>, T2 : AsRef<[u8]> {
    let database_sequences : Vec<Sequence<Dna>> = database.iter().map(|(id, seq)| Sequence::new(id.as_ref(), seq.as_ref())).collect();
    let mut query_source = VecSource::<Dna>::from_pairs(queries);
    let options = RunOptions{params : SearchParams::new(max_accepts, max_rejects, min_identity), ..Default::default()};
    run_search(database_sequences, &mut query_source, |database| Ok(open_hit_writer(output_path, options.default_format, database)?), &options, observer)
} // end of search_collections



#[cfg(test)]
mod tests {

    use super::*;
    use crate::errors::SearchError;
    use crate::utils::progress::NoProgress;
    use parking_lot::Mutex;

    fn log_init_test() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn dna(id : &str, seq : &str) -> Sequence<Dna> {
        Sequence::new(id, seq.as_bytes())
    }

    // collects hits in memory, as (query id, target rank, identity)
    struct MemorySink {
        hits : Arc<Mutex<Vec<(String, usize, f32)>>>,
        committed : Arc<Mutex<bool>>,
        fail : bool,
    }

    impl HitSink<Dna> for MemorySink {
        fn write(&mut self, batch : &[QueryWithHits<Dna>]) -> Result<(), SearchError> {
            if self.fail {
                return Err(SearchError::InvalidParameter("sink failure".to_string()));
            }
            let mut hits = self.hits.lock();
            for (query, list) in batch {
                for hit in list {
                    hits.push((query.get_id().to_string(), hit.target, hit.identity));
                }
            }
            Ok(())
        }

        fn commit(&mut self) -> Result<(), SearchError> {
            *self.committed.lock() = true;
            Ok(())
        }
    }

    fn random_dna(len : usize, seed : &mut u64) -> String {
        // xorshift, enough to get unrelated sequences
        let mut s = String::with_capacity(len);
        for _ in 0..len {
            *seed ^= *seed << 13;
            *seed ^= *seed >> 7;
            *seed ^= *seed << 17;
            s.push(b"ACGT"[(*seed % 4) as usize] as char);
        }
        s
    }

    #[test]
    fn test_pipeline_in_memory() {
        log_init_test();
        let mut seed = 0x1234_5678_u64;
        let references : Vec<String> = (0..20).map(|_| random_dna(150, &mut seed)).collect();
        let db_seqs : Vec<Sequence<Dna>> = references.iter().enumerate().map(|(i, s)| dna(&format!("r{}", i), s)).collect();
        // queries 0..20 are the references, queries 20..30 are unrelated
        let mut queries : Vec<Sequence<Dna>> = references.iter().enumerate().map(|(i, s)| dna(&format!("q{}", i), s)).collect();
        for i in 20..30 {
            queries.push(dna(&format!("q{}", i), &random_dna(150, &mut seed)));
        }
        let hits = Arc::new(Mutex::new(Vec::new()));
        let committed = Arc::new(Mutex::new(false));
        let options = RunOptions{threads : Some(3), batch_size : 4, ..Default::default()};
        let mut source = VecSource::new(queries);
        let summary = run_search(db_seqs, &mut source, |_| Ok(MemorySink{hits : hits.clone(), committed : committed.clone(), fail : false}),
                &options, Arc::new(NoProgress)).unwrap();
        assert_eq!(summary.nb_queries, 30);
        assert_eq!(summary.nb_database_sequences, 20);
        assert!(*committed.lock());
        let mut hits = hits.lock().clone();
        hits.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(summary.nb_hits, hits.len());
        assert_eq!(hits.len(), 20);
        for (i, (query, target, identity)) in hits.iter().enumerate() {
            assert_eq!(query, &format!("q{}", i));
            assert_eq!(*target, i);
            assert_eq!(*identity, 1.);
        }
    }

    #[test]
    fn test_sink_failure_not_committed() {
        log_init_test();
        let db_seqs = vec![dna("r1", "ACGTACGTACGT")];
        let queries : Vec<Sequence<Dna>> = (0..10).map(|i| dna(&format!("q{}", i), "ACGTACGTACGT")).collect();
        let committed = Arc::new(Mutex::new(false));
        let options = RunOptions{threads : Some(2), batch_size : 1, ..Default::default()};
        let mut source = VecSource::new(queries);
        let res = run_search(db_seqs, &mut source, |_| Ok(MemorySink{hits : Arc::new(Mutex::new(Vec::new())), committed : committed.clone(), fail : true}),
                &options, Arc::new(NoProgress));
        assert!(res.is_err());
        assert!(!*committed.lock());
    }

    #[test]
    fn test_sink_error_reaches_caller() {
        log_init_test();
        let db_seqs = vec![dna("r1", "ACGTACGTACGT")];
        let queries : Vec<Sequence<Dna>> = (0..200).map(|i| dna(&format!("q{}", i), "ACGTACGTACGT")).collect();
        let options = RunOptions{threads : Some(1), batch_size : 1, ..Default::default()};
        let mut source = VecSource::new(queries);
        let err = run_search(db_seqs, &mut source, |_| Ok(MemorySink{hits : Arc::new(Mutex::new(Vec::new())), committed : Arc::new(Mutex::new(false)), fail : true}),
                &options, Arc::new(NoProgress)).unwrap_err();
        assert!(format!("{:#}", err).contains("sink failure"));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let options = RunOptions{params : SearchParams::new(1, 16, 2.), ..Default::default()};
        let mut source = VecSource::<Dna>::new(Vec::new());
        let res = run_search(Vec::new(), &mut source, |_| Ok(MemorySink{hits : Arc::new(Mutex::new(Vec::new())), committed : Arc::new(Mutex::new(false)), fail : false}),
                &options, Arc::new(NoProgress));
        assert!(res.is_err());
    }

    #[test]
    fn test_seq_type_parse() {
        assert_eq!("DNA".parse::<SeqType>().unwrap(), SeqType::Dna);
        assert_eq!("aa".parse::<SeqType>().unwrap(), SeqType::Protein);
        assert!("rna".parse::<SeqType>().is_err());
    }

} // end of mod tests
