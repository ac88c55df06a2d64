//! errors raised by database construction, sequence reading and hit writing


use std::path::PathBuf;


#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse sequence file {path:?} : {msg}")]
    Parse { path : PathBuf, msg : String },

    #[error("invalid parameter : {0}")]
    InvalidParameter(String),

    #[error("word size {word_size} not supported for {alphabet} (must be in 1..={max})")]
    InvalidWordSize { word_size : usize, alphabet : &'static str, max : usize },

    #[error("database already initialized")]
    AlreadyInitialized,

    #[error("csv output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("worker queue failed, a worker reported an error")]
    PoolFailed,

    #[error("worker {0} panicked : {1}")]
    WorkerPanic(usize, String),
} // end of SearchError
