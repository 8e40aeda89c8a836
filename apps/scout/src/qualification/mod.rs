//! Candidate qualification: date and name normalization, deduplication,
//! the AI gateway and the filter chain that strings them together.

pub mod filters;
pub mod gateway;
pub mod login;
pub mod names;
pub mod signature;
pub mod tenure;
