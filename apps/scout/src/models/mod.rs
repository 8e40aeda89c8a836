pub mod candidate;
pub mod run;

pub use candidate::{CandidateRecord, COLUMNS};
pub use run::{EmployerTarget, RunConfiguration};
