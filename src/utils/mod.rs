//! contains utils used in reading sequences, parameters and progress reporting

pub mod files;
pub mod parameters;
pub mod progress;

pub use files::*;
pub use parameters::*;
pub use progress::*;
