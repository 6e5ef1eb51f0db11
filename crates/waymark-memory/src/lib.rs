//! Complementary memory stores: tiered session/project/global chunks for
//! prompt-context injection, plus cross-run learning tables the Router
//! consults when scoring a new query (decomposition patterns, strategy
//! performance, failure patterns) and a nearest-case index over past runs.

pub mod case_store;
pub mod embedding;
pub mod store;
pub mod types;

pub use case_store::{CaseRecord, ScoredCase};
pub use store::MemoryStore;
pub use types::*;
