//! structures related to search parameters


use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::io::{BufReader, BufWriter};

use serde::{Deserialize, Serialize};
use serde_json::{to_writer_pretty};

use crate::errors::SearchError;


/// name of parameter dump file
pub const PARAMETERS_FILE : &str = "seedsearch.parameters.json";


/// scoring of the global aligner.
/// match and mismatch are used by Dna, Protein uses Blosum62. Penalties are positive values.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignParams {
    pub match_score : i32,
    pub mismatch_score : i32,
    /// penalty of an interior gap of length l is gap_open + l * gap_extend
    pub gap_open : i32,
    pub gap_extend : i32,
    /// penalties of gaps at either end of the alignment
    pub terminal_gap_open : i32,
    pub terminal_gap_extend : i32,
}


impl Default for AlignParams {
    fn default() -> Self {
        AlignParams{match_score : 2, mismatch_score : -4, gap_open : 20, gap_extend : 2, terminal_gap_open : 2, terminal_gap_extend : 1}
    }
} // end of impl Default for AlignParams


impl AlignParams {
    pub fn check(&self) -> Result<(), SearchError> {
        if self.gap_open < 0 || self.gap_extend < 0 || self.terminal_gap_open < 0 || self.terminal_gap_extend < 0 {
            return Err(SearchError::InvalidParameter("gap penalties must be non negative".to_string()));
        }
        if self.match_score <= self.mismatch_score {
            return Err(SearchError::InvalidParameter("match score must be greater than mismatch score".to_string()));
        }
        Ok(())
    }
} // end of impl AlignParams


//=====================================================================================


/// Acceptance thresholds of the search, shared by all search workers of a run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// search for a query stops after this number of accepted hits
    pub max_accepts : usize,
    /// search for a query stops after this number of consecutive rejected candidates
    pub max_rejects : usize,
    /// minimal identity fraction in [0,1] of an accepted hit
    pub min_identity : f32,
    /// kmer size, alphabet default if None
    pub word_size : Option<usize>,
    ///
    pub align : AlignParams,
} // end of struct SearchParams


impl Default for SearchParams {
    fn default() -> Self {
        SearchParams{max_accepts : 1, max_rejects : 16, min_identity : 0.75, word_size : None, align : AlignParams::default()}
    }
}


impl SearchParams {
    pub fn new(max_accepts : usize, max_rejects : usize, min_identity : f32) -> Self {
        SearchParams{max_accepts, max_rejects, min_identity, ..Default::default()}
    }

    pub fn with_word_size(mut self, word_size : usize) -> Self {
        self.word_size = Some(word_size);
        self
    }

    pub fn with_align_params(mut self, align : AlignParams) -> Self {
        self.align = align;
        self
    }

    /// returns word size to use for an alphabet with default word size `default`
    pub fn get_word_size(&self, default : usize) -> usize {
        self.word_size.unwrap_or(default)
    }

    pub fn check(&self) -> Result<(), SearchError> {
        if !(0. ..= 1.).contains(&self.min_identity) {
            return Err(SearchError::InvalidParameter(format!("min identity must be in [0,1], got {}", self.min_identity)));
        }
        if self.max_accepts == 0 {
            return Err(SearchError::InvalidParameter("max accepts must be at least 1".to_string()));
        }
        if self.max_rejects == 0 {
            return Err(SearchError::InvalidParameter("max rejects must be at least 1".to_string()));
        }
        self.align.check()
    } // end of check


    /// dump in json file PARAMETERS_FILE of directory dirpath
    pub fn dump_json(&self, dirpath : &Path) -> Result<PathBuf, SearchError> {
        //
        let filepath = dirpath.join(PARAMETERS_FILE);
        //
        log::info!("dumping SearchParams in json file : {:?}", filepath);
        //
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&filepath).map_err(|e| {
            log::error!("SearchParams dump : dump could not open file {:?}", filepath.as_os_str());
            e
        })?;
        //
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, &self).map_err(|e| SearchError::Io(e.into()))?;
        //
        Ok(filepath)
    } // end of dump_json


    /// reload from a json dump
    pub fn reload_json(filepath : &Path) -> Result<Self, SearchError> {
        log::info!("in reload_json {:?}", filepath);
        //
        let file = OpenOptions::new().read(true).open(filepath).map_err(|e| {
            log::error!("SearchParams reload_json : reload could not open file {:?}", filepath.as_os_str());
            e
        })?;
        //
        let reader = BufReader::new(file);
        let params : Self = serde_json::from_reader(reader).map_err(|e| SearchError::InvalidParameter(format!("{:?} : {}", filepath, e)))?;
        params.check()?;
        //
        log::info!("SearchParams reload, max_accepts : {}, max_rejects : {}, min_identity : {}", params.max_accepts, params.max_rejects, params.min_identity);
        //
        Ok(params)
    } // end of reload_json

} // end of impl SearchParams



// end of mod tests
