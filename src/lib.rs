//! Mining throughput and reprocessing value calculator
//!
//! Turns a harvesting rate model plus cached reference data and prices into
//! per-material throughput and income estimates, and ranks candidate materials.

pub mod calculator;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod profile;
pub mod provider;
pub mod sample;

pub use calculator::{CalcOutcome, CalcRequest, Calculation, calculate};
pub use error::{CalcError, ProviderError};
