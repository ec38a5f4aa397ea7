pub mod generation;
pub mod job;
pub mod output;

pub use generation::*;
pub use job::*;
pub use output::*;
