//! Progress reporting.
//!
//! The pipeline reports on named stages through an injected [ProgressObserver].
//! Reporting never feeds back into control flow, an observer must not block as it can be called
//! from worker threads.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use strum_macros::{Display, EnumIter};


#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnitType {
    Bytes,
    Count,
}


#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ProgressStage {
    #[strum(serialize = "Read database")]
    ReadDatabase,
    #[strum(serialize = "Analyze database")]
    StatsDatabase,
    #[strum(serialize = "Index database")]
    IndexDatabase,
    #[strum(serialize = "Read queries")]
    ReadQueries,
    #[strum(serialize = "Search database")]
    SearchDatabase,
    #[strum(serialize = "Write hits")]
    WriteHits,
} // end of ProgressStage


impl ProgressStage {
    pub fn get_unit(&self) -> UnitType {
        match self {
            ProgressStage::ReadDatabase | ProgressStage::ReadQueries => UnitType::Bytes,
            _ => UnitType::Count,
        }
    }

    fn rank(&self) -> usize {
        *self as usize
    }
} // end of impl ProgressStage



/// Receives progress of pipeline stages. All methods have an empty default.
pub trait ProgressObserver : Send + Sync {
    /// a stage becomes the active one
    fn activate(&self, _stage : ProgressStage) {}

    /// cumulative progress of a stage
    fn set(&self, _stage : ProgressStage, _num : usize, _total : usize) {}

    /// stage is completed
    fn finish(&self, _stage : ProgressStage) {}
} // end of trait ProgressObserver



/// An observer discarding everything
#[derive(Copy, Clone, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}


//=====================================================================================

const NB_STAGES : usize = 6;

#[derive(Copy, Clone, Default)]
struct StageState {
    num : usize,
    total : usize,
    last_logged_percent : Option<usize>,
    start : Option<Instant>,
}


/// Logs progress with log::info!, at most once per `step_percent` for each stage
/// and not more often than `min_interval`.
pub struct LogProgress {
    step_percent : usize,
    min_interval : Duration,
    state : Mutex<([StageState; NB_STAGES], Option<Instant>)>,
}


impl LogProgress {
    pub fn new(step_percent : usize, min_interval : Duration) -> Self {
        LogProgress{step_percent : step_percent.max(1), min_interval, state : Mutex::new(([StageState::default(); NB_STAGES], None))}
    }
} // end of impl LogProgress


impl Default for LogProgress {
    fn default() -> Self {
        LogProgress::new(10, Duration::from_millis(500))
    }
}


fn format_amount(unit : UnitType, amount : usize) -> String {
    match unit {
        UnitType::Count => format!("{}", amount),
        UnitType::Bytes => {
            if amount >= 1 << 30 {
                format!("{:.2} GB", amount as f64 / (1u64 << 30) as f64)
            }
            else if amount >= 1 << 20 {
                format!("{:.2} MB", amount as f64 / (1u64 << 20) as f64)
            }
            else if amount >= 1 << 10 {
                format!("{:.2} kB", amount as f64 / (1u64 << 10) as f64)
            }
            else {
                format!("{} B", amount)
            }
        }
    }
} // end of format_amount


impl ProgressObserver for LogProgress {

    fn activate(&self, stage : ProgressStage) {
        let mut guard = self.state.lock();
        let stage_state = &mut guard.0[stage.rank()];
        if stage_state.start.is_none() {
            stage_state.start = Some(Instant::now());
            log::info!("{} ...", stage);
        }
    }

    fn set(&self, stage : ProgressStage, num : usize, total : usize) {
        let mut guard = self.state.lock();
        let (stages, last_log) = &mut *guard;
        let stage_state = &mut stages[stage.rank()];
        stage_state.num = num;
        stage_state.total = total;
        let percent = if total > 0 { (100 * num.min(total)) / total } else { 100 };
        let step = percent / self.step_percent;
        let due = match stage_state.last_logged_percent {
            Some(last) => step > last / self.step_percent,
            None => true,
        };
        let too_early = match last_log {
            Some(t) => t.elapsed() < self.min_interval && percent < 100,
            None => false,
        };
        if due && !too_early {
            stage_state.last_logged_percent = Some(percent);
            *last_log = Some(Instant::now());
            let unit = stage.get_unit();
            log::info!("{} : {}% ({} / {})", stage, percent, format_amount(unit, num), format_amount(unit, total));
        }
    } // end of set

    fn finish(&self, stage : ProgressStage) {
        let guard = self.state.lock();
        let stage_state = &guard.0[stage.rank()];
        let elapsed = stage_state.start.map(|t| t.elapsed().as_secs_f32()).unwrap_or(0.);
        log::info!("{} done, {} in {:.3} s", stage, format_amount(stage.get_unit(), stage_state.num), elapsed);
    }

} // end of impl ProgressObserver for LogProgress


//=====================================================================================


// end of mod tests
