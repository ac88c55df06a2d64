//! Output of hits.
//!
//! Hits are written one line per (query, hit) either as tab separated values without header
//! (columns in the spirit of blast outfmt 6) or as csv with a header line.
//! The format is detected from the output file extension.
//!
//! Output is written to a temporary file `<output>.partial` renamed to `<output>` on commit,
//! so a failed run does not leave a truncated output file that could be taken for a complete one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::alphabet::Alphabet;
use crate::database::Database;
use crate::errors::SearchError;
use crate::search::{Hit, QueryWithHits};
use crate::sequence::Sequence;


#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    /// tab separated, no header
    #[strum(to_string = "tsv", serialize = "b6", serialize = "m8", serialize = "txt")]
    Tabular,
    #[strum(serialize = "csv")]
    Csv,
}


impl OutputFormat {
    /// format from file extension, default if extension is absent or unknown
    pub fn detect(path : &Path, default : OutputFormat) -> OutputFormat {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<OutputFormat>().ok())
            .unwrap_or(default)
    }
} // end of impl OutputFormat



/// one output line
#[derive(Debug, Serialize, PartialEq)]
pub struct HitRecord<'a> {
    pub query : &'a str,
    pub target : &'a str,
    /// identity in percent
    pub identity : String,
    pub alignment_length : usize,
    pub mismatches : usize,
    pub gap_opens : usize,
    /// 1 based, inclusive, 0 when nothing is aligned
    pub query_start : usize,
    pub query_end : usize,
    pub target_start : usize,
    pub target_end : usize,
    pub score : i32,
    pub cigar : String,
}


fn one_based(range : &std::ops::Range<usize>) -> (usize, usize) {
    if range.is_empty() {
        (0, 0)
    }
    else {
        (range.start + 1, range.end)
    }
}


impl <'a> HitRecord<'a> {
    pub fn new(query_id : &'a str, target_id : &'a str, hit : &Hit) -> Self {
        let cigar = &hit.alignment.cigar;
        let (query_start, query_end) = one_based(&hit.alignment.query_range);
        let (target_start, target_end) = one_based(&hit.alignment.target_range);
        HitRecord{query : query_id, target : target_id, identity : format!("{:.1}", 100. * hit.identity),
            alignment_length : cigar.get_nb_columns(), mismatches : cigar.get_nb_mismatches(), gap_opens : cigar.get_nb_gap_opens(),
            query_start, query_end, target_start, target_end, score : hit.alignment.score, cigar : cigar.to_string()}
    }
} // end of impl HitRecord


//=====================================================================================


/// Receives batches of queries with their hits
pub trait HitSink<A : Alphabet> : Send {
    fn write(&mut self, batch : &[QueryWithHits<A>]) -> Result<(), SearchError>;

    /// flushes and makes output visible. Output of a sink dropped without commit is discarded.
    fn commit(&mut self) -> Result<(), SearchError>;
}



/// Writes hits in csv or tabular format to a file
pub struct HitWriter<A : Alphabet> {
    database : Arc<Database<A>>,
    format : OutputFormat,
    path : PathBuf,
    partial_path : PathBuf,
    writer : Option<csv::Writer<BufWriter<File>>>,
    nb_written : usize,
}


impl <A : Alphabet> HitWriter<A> {

    pub fn create(path : &Path, format : OutputFormat, database : Arc<Database<A>>) -> Result<Self, SearchError> {
        let mut partial_name = path.file_name().map(|n| n.to_os_string()).ok_or_else(|| {
            SearchError::InvalidParameter(format!("output path {:?} has no file name", path))
        })?;
        partial_name.push(".partial");
        let partial_path = path.with_file_name(partial_name);
        log::info!("HitWriter writing {} hits in {:?}", format, path);
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&partial_path).map_err(|e| {
            log::error!("HitWriter could not open file {:?}", partial_path.as_os_str());
            e
        })?;
        let writer = match format {
            OutputFormat::Tabular => csv::WriterBuilder::new().delimiter(b'\t').has_headers(false).from_writer(BufWriter::new(file)),
            OutputFormat::Csv => csv::WriterBuilder::new().has_headers(true).from_writer(BufWriter::new(file)),
        };
        Ok(HitWriter{database, format, path : path.to_path_buf(), partial_path, writer : Some(writer), nb_written : 0})
    } // end of create

    pub fn get_format(&self) -> OutputFormat {
        self.format
    }

    pub fn get_nb_written(&self) -> usize {
        self.nb_written
    }

    fn write_query(&mut self, query : &Sequence<A>, hits : &[Hit]) -> Result<(), SearchError> {
        let writer = self.writer.as_mut().ok_or_else(|| SearchError::InvalidParameter("HitWriter already committed".to_string()))?;
        for hit in hits {
            let target = self.database.get_sequence(hit.target);
            writer.serialize(HitRecord::new(query.get_id(), target.get_id(), hit))?;
            self.nb_written += 1;
        }
        Ok(())
    }
} // end of impl HitWriter


impl <A : Alphabet> HitSink<A> for HitWriter<A> {

    fn write(&mut self, batch : &[QueryWithHits<A>]) -> Result<(), SearchError> {
        for (query, hits) in batch {
            self.write_query(query, hits)?;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), SearchError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => { return Ok(()); },
        };
        let mut bufwriter = writer.into_inner().map_err(|e| SearchError::Io(e.into_error()))?;
        bufwriter.flush()?;
        let file = bufwriter.into_inner().map_err(|e| SearchError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial_path, &self.path)?;
        log::info!("HitWriter committed {:?}, nb hits written : {}", self.path, self.nb_written);
        Ok(())
    } // end of commit
} // end of impl HitSink for HitWriter


impl <A : Alphabet> Drop for HitWriter<A> {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            log::warn!("HitWriter dropped without commit, removing {:?}", self.partial_path);
            let _ = fs::remove_file(&self.partial_path);
        }
    }
}


/// opens a HitWriter with format detected from path extension
pub fn open_hit_writer<A : Alphabet>(path : &Path, default : OutputFormat, database : Arc<Database<A>>) -> Result<HitWriter<A>, SearchError> {
    let format = OutputFormat::detect(path, default);
    HitWriter::create(path, format, database)
}



#[cfg(test)]
mod tests {

    use super::*;
    use crate::alphabet::Dna;
    use crate::search::GlobalSearch;
    use crate::utils::parameters::SearchParams;
    use crate::utils::progress::NoProgress;

    fn build_db() -> Arc<Database<Dna>> {
        let mut db = Database::<Dna>::new(8).unwrap();
        db.initialize(vec![Sequence::new("r1", b"ACGTACGTACGT"), Sequence::new("r2", b"ACGTTGCAACGGTACCATGG")], &NoProgress).unwrap();
        Arc::new(db)
    }

    fn batch(db : &Arc<Database<Dna>>) -> Vec<QueryWithHits<Dna>> {
        let mut search = GlobalSearch::new(db.clone(), &SearchParams::default());
        let query = Sequence::<Dna>::new("q1", b"ACGTACGTACGT");
        let hits = search.query(&query);
        vec![(query, hits)]
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(OutputFormat::detect(Path::new("out.csv"), OutputFormat::Tabular), OutputFormat::Csv);
        assert_eq!(OutputFormat::detect(Path::new("out.CSV"), OutputFormat::Tabular), OutputFormat::Csv);
        assert_eq!(OutputFormat::detect(Path::new("out.b6"), OutputFormat::Csv), OutputFormat::Tabular);
        assert_eq!(OutputFormat::detect(Path::new("out"), OutputFormat::Csv), OutputFormat::Csv);
        assert_eq!(OutputFormat::detect(Path::new("out.aln"), OutputFormat::Tabular), OutputFormat::Tabular);
    }

    #[test]
    fn test_tabular_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.tsv");
        let db = build_db();
        let mut writer = open_hit_writer(&path, OutputFormat::Csv, db.clone()).unwrap();
        assert_eq!(writer.get_format(), OutputFormat::Tabular);
        writer.write(&batch(&db)).unwrap();
        assert!(!path.exists());
        writer.commit().unwrap();
        assert_eq!(writer.get_nb_written(), 1);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "q1\tr1\t100.0\t12\t0\t0\t1\t12\t1\t12\t24\t12=\n");
        assert!(!dir.path().join("hits.tsv.partial").exists());
    }

    #[test]
    fn test_csv_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.csv");
        let db = build_db();
        let mut writer = open_hit_writer(&path, OutputFormat::Tabular, db.clone()).unwrap();
        writer.write(&batch(&db)).unwrap();
        writer.commit().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "query,target,identity,alignment_length,mismatches,gap_opens,query_start,query_end,target_start,target_end,score,cigar");
        assert!(lines.next().unwrap().starts_with("q1,r1,100.0,12"));
    }

    #[test]
    fn test_drop_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hits.tsv");
        let db = build_db();
        {
            let mut writer = open_hit_writer(&path, OutputFormat::Tabular, db.clone()).unwrap();
            writer.write(&batch(&db)).unwrap();
        }
        assert!(!path.exists());
        assert!(!dir.path().join("hits.tsv.partial").exists());
    }

    #[test]
    fn test_unwritable_output() {
        let db = build_db();
        let res = open_hit_writer(Path::new("/nonexistent/dir/hits.tsv"), OutputFormat::Tabular, db);
        assert!(matches!(res, Err(SearchError::Io(_))));
    }

} // end of mod tests
