use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A completed run recorded for nearest-neighbor retrieval: "here is a
/// similar query and how it was handled last time." Recorded and queried by
/// `MemoryStore::record_case`/`nearest_cases`, which owns the `cases` table
/// alongside the store's other cross-run learning tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub query: String,
    pub plan_summary: String,
    pub outcome_score: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCase {
    pub case: CaseRecord,
    pub similarity: f64,
}
