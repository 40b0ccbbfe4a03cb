//! teamsearch - Hybrid ranked search over a team directory
//!
//! Catalog rows are embedded into a vector store. Queries retrieve nearest
//! neighbors, then lexical and tag signals are fused into the ranking,
//! near-duplicate results are diversified, and pages are served with an
//! opaque cursor.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod query;
pub mod retrieval;
pub mod state;

pub use error::{Result, TeamSearchError};
