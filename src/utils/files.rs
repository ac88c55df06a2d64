//! Sequence sources.
//!
//! Query and database sequences are read through the [SequenceSource] trait, by batches, with
//! cumulative bytes read for progress reporting.
//! Files (fasta or fastq, possibly gzipped) are parsed with needletail.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use needletail::{FastxReader, errors::ParseErrorKind};

use crate::alphabet::Alphabet;
use crate::errors::SearchError;
use crate::sequence::Sequence;
use crate::utils::progress::{ProgressObserver, ProgressStage};


/// A lazy, forward only stream of sequences
pub trait SequenceSource<A : Alphabet> {
    /// appends at most `max` sequences to `batch`, returns the number appended (0 at end of stream)
    fn read_batch(&mut self, max : usize, batch : &mut Vec<Sequence<A>>) -> Result<usize, SearchError>;

    /// cumulative number of bytes consumed
    fn bytes_read(&self) -> usize;

    /// total number of bytes of the stream
    fn bytes_total(&self) -> usize;

    fn is_eof(&self) -> bool;
} // end of trait SequenceSource



/// reads a whole source, reporting progress on stage
pub fn read_all<A : Alphabet, S : SequenceSource<A>>(source : &mut S, stage : ProgressStage, observer : &dyn ProgressObserver) -> Result<Vec<Sequence<A>>, SearchError> {
    let mut sequences = Vec::<Sequence<A>>::new();
    observer.activate(stage);
    while !source.is_eof() {
        let nb_read = source.read_batch(1024, &mut sequences)?;
        observer.set(stage, source.bytes_read(), source.bytes_total());
        if nb_read == 0 {
            break;
        }
    }
    observer.finish(stage);
    log::debug!("read_all, stage {} nb sequences : {}", stage, sequences.len());
    Ok(sequences)
} // end of read_all


//=====================================================================================


/// A reader counting bytes going through it
pub struct CountingReader<R> {
    inner : R,
    count : Arc<AtomicUsize>,
}

impl <R : Read> CountingReader<R> {
    pub fn new(inner : R) -> Self {
        CountingReader{inner, count : Arc::new(AtomicUsize::new(0))}
    }

    /// a shared counter of bytes read so far
    pub fn get_counter(&self) -> Arc<AtomicUsize> {
        self.count.clone()
    }
} // end of impl CountingReader


impl <R : Read> Read for CountingReader<R> {
    fn read(&mut self, buf : &mut [u8]) -> io::Result<usize> {
        let nb = self.inner.read(buf)?;
        self.count.fetch_add(nb, Ordering::Relaxed);
        Ok(nb)
    }
}


//=====================================================================================


/// fasta/fastq source, gzip is detected by needletail
pub struct FastxSource<A : Alphabet> {
    /// used in error messages
    path : PathBuf,
    reader : Option<Box<dyn FastxReader>>,
    counter : Arc<AtomicUsize>,
    total : usize,
    eof : bool,
    _alphabet : std::marker::PhantomData<A>,
}


impl <A : Alphabet> FastxSource<A> {

    /// opens a fasta or fastq file
    pub fn from_path(path : &Path) -> Result<Self, SearchError> {
        log::info!("opening sequence file {:?}", path);
        let total = fs::metadata(path).map_err(|e| {
            log::error!("FastxSource could not get metadata of file {:?}", path);
            e
        })?.len() as usize;
        let file = File::open(path)?;
        Self::from_reader(file, path, total)
    }

    /// a source on any reader, `total` is the number of bytes expected for progress reporting
    pub fn from_reader<R : Read + Send + 'static>(reader : R, name : &Path, total : usize) -> Result<Self, SearchError> {
        let counting = CountingReader::new(reader);
        let counter = counting.get_counter();
        let path = name.to_path_buf();
        let reader = match needletail::parse_fastx_reader(counting) {
            Ok(reader) => Some(reader),
            Err(e) if matches!(e.kind, ParseErrorKind::EmptyFile) => None,
            Err(e) => { return Err(SearchError::Parse{path, msg : e.to_string()}); },
        };
        let eof = reader.is_none();
        Ok(FastxSource{path, reader, counter, total, eof, _alphabet : std::marker::PhantomData})
    } // end of from_reader

} // end of impl FastxSource


// fasta id is the header up to first white space
fn header_to_id(header : &[u8]) -> String {
    let end = header.iter().position(|c| c.is_ascii_whitespace()).unwrap_or(header.len());
    String::from_utf8_lossy(&header[..end]).into_owned()
}


impl <A : Alphabet> SequenceSource<A> for FastxSource<A> {

    fn read_batch(&mut self, max : usize, batch : &mut Vec<Sequence<A>>) -> Result<usize, SearchError> {
        let reader = match (self.eof, self.reader.as_mut()) {
            (false, Some(reader)) => reader,
            _ => { return Ok(0); },
        };
        let mut nb_read = 0;
        while nb_read < max {
            match reader.next() {
                Some(Ok(record)) => {
                    let id = header_to_id(record.id());
                    batch.push(Sequence::new(&id, &record.seq()));
                    nb_read += 1;
                }
                Some(Err(e)) => {
                    log::error!("bad record in file {:?} : {}", self.path, e);
                    return Err(SearchError::Parse{path : self.path.clone(), msg : e.to_string()});
                }
                None => {
                    self.eof = true;
                    break;
                }
            }
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("FastxSource read_batch nb read : {}, bytes read : {}", nb_read, self.bytes_read());
        }
        Ok(nb_read)
    } // end of read_batch

    fn bytes_read(&self) -> usize {
        self.counter.load(Ordering::Relaxed).min(self.total.max(1))
    }

    fn bytes_total(&self) -> usize {
        self.total
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
} // end of impl SequenceSource for FastxSource


//=====================================================================================


/// An in memory source, bytes are counted as residues and ids
pub struct VecSource<A : Alphabet> {
    sequences : std::vec::IntoIter<Sequence<A>>,
    read : usize,
    total : usize,
}

impl <A : Alphabet> VecSource<A> {
    pub fn new(sequences : Vec<Sequence<A>>) -> Self {
        let total = sequences.iter().fold(0, |acc, s| acc + s.len() + s.get_id().len());
        VecSource{sequences : sequences.into_iter(), read : 0, total}
    }

    /// from (id, residues) pairs
    pub fn from_pairs<I, S, T>(pairs : I) -> Self
        where I : IntoIterator<Item = (S, T)>, S : AsRef<str>, T : AsRef<[u8]> {
        let sequences = pairs.into_iter().map(|(id, seq)| Sequence::new(id.as_ref(), seq.as_ref())).collect();
        Self::new(sequences)
    }
} // end of impl VecSource


impl <A : Alphabet> SequenceSource<A> for VecSource<A> {
    fn read_batch(&mut self, max : usize, batch : &mut Vec<Sequence<A>>) -> Result<usize, SearchError> {
        let mut nb_read = 0;
        while nb_read < max {
            match self.sequences.next() {
                Some(seq) => {
                    self.read += seq.len() + seq.get_id().len();
                    batch.push(seq);
                    nb_read += 1;
                }
                None => break,
            }
        }
        Ok(nb_read)
    }

    fn bytes_read(&self) -> usize {
        self.read
    }

    fn bytes_total(&self) -> usize {
        self.total
    }

    fn is_eof(&self) -> bool {
        self.sequences.len() == 0
    }
} // end of impl SequenceSource for VecSource



// end of mod tests
