//! Global alignment of a query against a candidate database sequence.
//!
//! The default kernel is an affine gap Needleman-Wunsch (Gotoh) alignment with cheaper terminal gaps.
//! Identity of an alignment is the number of matching columns divided by the number of columns,
//! terminal gaps included.
//!
//! As the number of columns is at least max(len query, len target) and the number of matches at most
//! min(len query, len target), a candidate with min/max length ratio below the identity threshold
//! is rejected without alignment.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

use crate::alphabet::Alphabet;
use crate::utils::parameters::AlignParams;


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CigarOp {
    /// residues match
    Match,
    Mismatch,
    /// residue of query facing a gap in target
    Insertion,
    /// residue of target facing a gap in query
    Deletion,
}

impl CigarOp {
    pub fn to_char(&self) -> char {
        match self {
            CigarOp::Match => '=',
            CigarOp::Mismatch => 'X',
            CigarOp::Insertion => 'I',
            CigarOp::Deletion => 'D',
        }
    }
} // end of impl CigarOp


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CigarEntry {
    pub op : CigarOp,
    pub count : usize,
}


/// run length encoded alignment columns
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cigar(Vec<CigarEntry>);


impl Cigar {
    pub fn new() -> Self {
        Cigar(Vec::new())
    }

    /// appends count columns of op, merging with last entry
    pub fn push(&mut self, op : CigarOp, count : usize) {
        if count == 0 {
            return;
        }
        match self.0.last_mut() {
            Some(last) if last.op == op => last.count += count,
            _ => self.0.push(CigarEntry{op, count}),
        }
    }

    pub fn entries(&self) -> &[CigarEntry] {
        &self.0
    }

    fn reverse(&mut self) {
        self.0.reverse();
    }

    fn count_op(&self, op : CigarOp) -> usize {
        self.0.iter().filter(|e| e.op == op).map(|e| e.count).sum()
    }

    /// number of alignment columns
    pub fn get_nb_columns(&self) -> usize {
        self.0.iter().map(|e| e.count).sum()
    }

    pub fn get_nb_matches(&self) -> usize {
        self.count_op(CigarOp::Match)
    }

    pub fn get_nb_mismatches(&self) -> usize {
        self.count_op(CigarOp::Mismatch)
    }

    /// number of gaps (runs of insertions or deletions)
    pub fn get_nb_gap_opens(&self) -> usize {
        self.0.iter().filter(|e| e.op == CigarOp::Insertion || e.op == CigarOp::Deletion).count()
    }

    /// matching columns over all columns, 0 for an empty cigar
    pub fn identity(&self) -> f32 {
        let nb_columns = self.get_nb_columns();
        if nb_columns == 0 {
            return 0.;
        }
        self.get_nb_matches() as f32 / nb_columns as f32
    }
} // end of impl Cigar


impl fmt::Display for Cigar {
    fn fmt(&self, f : &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.0 {
            write!(f, "{}{}", entry.count, entry.op.to_char())?;
        }
        Ok(())
    }
}


//=====================================================================================


/// An alignment of a query against a database sequence
#[derive(Clone, Debug, PartialEq)]
pub struct Alignment {
    pub cigar : Cigar,
    /// part of query facing target residues (terminal insertions excluded)
    pub query_range : Range<usize>,
    /// part of target facing query residues (terminal deletions excluded)
    pub target_range : Range<usize>,
    pub score : i32,
}


impl Alignment {
    /// builds ranges from a global cigar
    fn from_global_cigar(cigar : Cigar, query_len : usize, target_len : usize, score : i32) -> Self {
        let entries = cigar.entries();
        let leading = |op : CigarOp| entries.first().filter(|e| e.op == op).map(|e| e.count).unwrap_or(0);
        let trailing = |op : CigarOp| entries.last().filter(|e| e.op == op).map(|e| e.count).unwrap_or(0);
        let q_start = leading(CigarOp::Insertion).min(query_len);
        let q_end = query_len.saturating_sub(trailing(CigarOp::Insertion)).max(q_start);
        let t_start = leading(CigarOp::Deletion).min(target_len);
        let t_end = target_len.saturating_sub(trailing(CigarOp::Deletion)).max(t_start);
        Alignment{cigar, query_range : q_start..q_end, target_range : t_start..t_end, score}
    }

    pub fn identity(&self) -> f32 {
        self.cigar.identity()
    }
} // end of impl Alignment



/// The residue level comparison kernel used by the search once a candidate has been selected by seeds.
pub trait Aligner<A : Alphabet> : Send {
    /// aligns query against target. Returns None when the candidate is known not to reach min_identity
    /// without aligning.
    fn align(&mut self, query : &[u8], target : &[u8], min_identity : f32) -> Option<Alignment>;
}


/// upper bound of identity of a global alignment of sequences of length l1 and l2
pub fn max_identity(l1 : usize, l2 : usize) -> f32 {
    let max_len = l1.max(l2);
    if max_len == 0 {
        return 0.;
    }
    l1.min(l2) as f32 / max_len as f32
}


//=====================================================================================

const NEG_INF : i32 = i32::MIN / 4;

/// default bound on dp matrix cells (one traceback byte each) of an alignment
pub const DEFAULT_MAX_ALIGN_CELLS : usize = 1 << 30;

// state of traceback
const FROM_M : u8 = 0;
const FROM_X : u8 = 1;
const FROM_Y : u8 = 2;


#[inline]
fn best3(m : i32, x : i32, y : i32) -> (i32, u8) {
    if m >= x && m >= y {
        (m, FROM_M)
    }
    else if x >= y {
        (x, FROM_X)
    }
    else {
        (y, FROM_Y)
    }
}


/// Gotoh global aligner. Scratch buffers are kept between calls, so there is one aligner per search worker.
pub struct GlobalAligner<A : Alphabet> {
    params : AlignParams,
    /// score rows of diagonal (M), vertical (X) and horizontal (Y) states
    m_prev : Vec<i32>,
    x_prev : Vec<i32>,
    y_prev : Vec<i32>,
    m_cur : Vec<i32>,
    x_cur : Vec<i32>,
    y_cur : Vec<i32>,
    /// traceback, for each cell 2 bits by state : predecessor of M, X, Y
    trace : Vec<u8>,
    /// pairs needing more cells are rejected without alignment
    max_cells : usize,
    _alphabet : PhantomData<A>,
} // end of struct GlobalAligner


impl <A : Alphabet> GlobalAligner<A> {

    pub fn new(params : AlignParams) -> Self {
        GlobalAligner{params, m_prev : Vec::new(), x_prev : Vec::new(), y_prev : Vec::new(),
            m_cur : Vec::new(), x_cur : Vec::new(), y_cur : Vec::new(), trace : Vec::new(), max_cells : DEFAULT_MAX_ALIGN_CELLS, _alphabet : PhantomData}
    }

    /// sets the bound on (len query + 1) * (len target + 1)
    pub fn with_max_cells(mut self, max_cells : usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn get_params(&self) -> &AlignParams {
        &self.params
    }

    // open and extension penalty of a gap, terminal when it runs along the border of the dp matrix
    #[inline]
    fn gap_costs(&self, terminal : bool) -> (i32, i32) {
        if terminal {
            (self.params.terminal_gap_open + self.params.terminal_gap_extend, self.params.terminal_gap_extend)
        }
        else {
            (self.params.gap_open + self.params.gap_extend, self.params.gap_extend)
        }
    }

    /// full global alignment, without early exit
    pub fn align_global(&mut self, query : &[u8], target : &[u8]) -> Alignment {
        let n = query.len();
        let m = target.len();
        let width = m + 1;
        for row in [&mut self.m_prev, &mut self.x_prev, &mut self.y_prev, &mut self.m_cur, &mut self.x_cur, &mut self.y_cur] {
            row.clear();
            row.resize(width, NEG_INF);
        }
        self.trace.clear();
        self.trace.resize((n + 1) * width, 0);
        //
        // row 0 : leading deletions
        self.m_prev[0] = 0;
        for j in 1..=m {
            let (open, extend) = self.gap_costs(true);
            let (from_open, state) = best3(self.m_prev[j - 1], self.x_prev[j - 1], NEG_INF);
            let opened = from_open - open;
            let extended = self.y_prev[j - 1] - extend;
            if extended >= opened && self.y_prev[j - 1] > NEG_INF {
                self.y_prev[j] = extended;
                self.trace[j] = FROM_Y << 4;
            }
            else {
                self.y_prev[j] = opened;
                self.trace[j] = state << 4;
            }
        }
        //
        for i in 1..=n {
            let q = query[i - 1];
            let row = i * width;
            self.m_cur[0] = NEG_INF;
            self.y_cur[0] = NEG_INF;
            // column 0 : leading insertions
            let (open, extend) = self.gap_costs(true);
            let (from_open, state) = best3(self.m_prev[0], NEG_INF, self.y_prev[0]);
            if self.x_prev[0] > NEG_INF && self.x_prev[0] - extend >= from_open - open {
                self.x_cur[0] = self.x_prev[0] - extend;
                self.trace[row] = FROM_X << 2;
            }
            else {
                self.x_cur[0] = from_open - open;
                self.trace[row] = state << 2;
            }
            let (h_open, h_extend) = self.gap_costs(i == n);
            for j in 1..=m {
                let t = target[j - 1];
                let mut trace = 0u8;
                // diagonal
                let (diag, state) = best3(self.m_prev[j - 1], self.x_prev[j - 1], self.y_prev[j - 1]);
                self.m_cur[j] = diag + A::score(q, t, &self.params);
                trace |= state;
                // vertical, query residue against gap
                let (v_open, v_extend) = self.gap_costs(j == m);
                let (from_open, state) = best3(self.m_prev[j], NEG_INF, self.y_prev[j]);
                let extended = self.x_prev[j] - v_extend;
                if extended >= from_open - v_open {
                    self.x_cur[j] = extended;
                    trace |= FROM_X << 2;
                }
                else {
                    self.x_cur[j] = from_open - v_open;
                    trace |= state << 2;
                }
                // horizontal, target residue against gap
                let (from_open, state) = best3(self.m_cur[j - 1], self.x_cur[j - 1], NEG_INF);
                let extended = self.y_cur[j - 1] - h_extend;
                if extended >= from_open - h_open {
                    self.y_cur[j] = extended;
                    trace |= FROM_Y << 4;
                }
                else {
                    self.y_cur[j] = from_open - h_open;
                    trace |= state << 4;
                }
                self.trace[row + j] = trace;
            }
            std::mem::swap(&mut self.m_prev, &mut self.m_cur);
            std::mem::swap(&mut self.x_prev, &mut self.x_cur);
            std::mem::swap(&mut self.y_prev, &mut self.y_cur);
        }
        // prev rows now hold row n
        let (score, mut state) = best3(self.m_prev[m], self.x_prev[m], self.y_prev[m]);
        //
        // traceback
        //
        let mut cigar = Cigar::new();
        let (mut i, mut j) = (n, m);
        while i > 0 || j > 0 {
            let trace = self.trace[i * width + j];
            match state {
                FROM_M if i > 0 && j > 0 => {
                    let op = if A::matches(query[i - 1], target[j - 1]) { CigarOp::Match } else { CigarOp::Mismatch };
                    cigar.push(op, 1);
                    state = trace & 3;
                    i -= 1;
                    j -= 1;
                }
                FROM_X if i > 0 => {
                    cigar.push(CigarOp::Insertion, 1);
                    state = (trace >> 2) & 3;
                    i -= 1;
                }
                FROM_Y if j > 0 => {
                    cigar.push(CigarOp::Deletion, 1);
                    state = (trace >> 4) & 3;
                    j -= 1;
                }
                // borders of matrix
                _ => {
                    if i > 0 {
                        cigar.push(CigarOp::Insertion, 1);
                        i -= 1;
                        state = FROM_X;
                    }
                    else {
                        cigar.push(CigarOp::Deletion, 1);
                        j -= 1;
                        state = FROM_Y;
                    }
                }
            }
        }
        cigar.reverse();
        Alignment::from_global_cigar(cigar, n, m, score)
    } // end of align_global

} // end of impl GlobalAligner


impl <A : Alphabet> Aligner<A> for GlobalAligner<A> {

    fn align(&mut self, query : &[u8], target : &[u8], min_identity : f32) -> Option<Alignment> {
        if max_identity(query.len(), target.len()) < min_identity {
            log::trace!("GlobalAligner early exit, lengths {} {}", query.len(), target.len());
            return None;
        }
        let nb_cells = (query.len() + 1).saturating_mul(target.len() + 1);
        if nb_cells > self.max_cells {
            log::warn!("GlobalAligner skipping pair of lengths {} {}, {} cells above limit {}",
                    query.len(), target.len(), nb_cells, self.max_cells);
            return None;
        }
        Some(self.align_global(query, target))
    }

} // end of impl Aligner for GlobalAligner



// end of mod tests
