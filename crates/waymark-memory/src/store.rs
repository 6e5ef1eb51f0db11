use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{
    MemoryChunk, MemoryConfig, MemoryContext, MemoryResult, MemoryRetrievalMeta,
    MemorySearchResult, MemoryStats, MemoryTier, SearchMemoryRequest, StoreMessageRequest,
};

/// Complementary-store backing: session/project/global chunks plus the
/// cross-run learning tables (decomposition patterns, strategy performance,
/// failure patterns) the Router consults before planning a new run.
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> MemoryResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> MemoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init_schema(conn: &Connection) -> MemoryResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                tier TEXT NOT NULL,
                session_id TEXT,
                project_id TEXT,
                source TEXT NOT NULL,
                source_path TEXT,
                source_mtime INTEGER,
                source_size INTEGER,
                source_hash TEXT,
                created_at TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                metadata TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_tier ON chunks(tier);
            CREATE INDEX IF NOT EXISTS idx_chunks_session ON chunks(session_id);
            CREATE INDEX IF NOT EXISTS idx_chunks_project ON chunks(project_id);

            CREATE TABLE IF NOT EXISTS decomposition_patterns (
                query_pattern TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS strategy_performance (
                user_id TEXT NOT NULL,
                strategy TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (user_id, strategy)
            );

            CREATE TABLE IF NOT EXISTS failure_patterns (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cases (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                plan_summary TEXT NOT NULL,
                outcome_score REAL NOT NULL,
                created_at TEXT NOT NULL,
                embedding BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Records a completed run for nearest-case reuse by the Router: `{query
    /// -> plan -> outcome}`. Best-effort by convention at the call site, not
    /// here — this returns the real error so callers can decide.
    pub async fn record_case(&self, query: &str, plan_summary: &str, outcome_score: f64) -> MemoryResult<()> {
        let vector = crate::embedding::embed(query);
        let blob: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO cases (id, query, plan_summary, outcome_score, created_at, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![Uuid::new_v4().to_string(), query, plan_summary, outcome_score, Utc::now().to_rfc3339(), blob],
        )?;
        Ok(())
    }

    /// Cosine-similarity nearest-case lookup the Analyzer consults as a soft
    /// signal alongside the `DecompositionPattern` prior. Empty (not an
    /// error) when no cases have been recorded yet.
    pub async fn nearest_cases(&self, query: &str, k: usize) -> MemoryResult<Vec<crate::case_store::ScoredCase>> {
        use crate::case_store::{CaseRecord, ScoredCase};
        use crate::embedding::cosine_similarity;

        let target = crate::embedding::embed(query);
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT id, query, plan_summary, outcome_score, created_at, embedding FROM cases")?;
        let rows = stmt.query_map([], |row| {
            let created_at: String = row.get(4)?;
            let blob: Vec<u8> = row.get(5)?;
            Ok((
                CaseRecord {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    plan_summary: row.get(2)?,
                    outcome_score: row.get(3)?,
                    created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                },
                blob,
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (case, blob) = row?;
            let vector: Vec<f32> = blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
            scored.push(ScoredCase { case, similarity: cosine_similarity(&target, &vector) });
        }
        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn store_chunk(&self, req: StoreMessageRequest) -> MemoryResult<MemoryChunk> {
        let token_count = estimate_tokens(&req.content);
        let chunk = MemoryChunk {
            id: Uuid::new_v4().to_string(),
            content: req.content,
            tier: req.tier,
            session_id: req.session_id,
            project_id: req.project_id,
            source: req.source,
            source_path: req.source_path,
            source_mtime: req.source_mtime,
            source_size: req.source_size,
            source_hash: req.source_hash,
            created_at: Utc::now(),
            token_count,
            metadata: req.metadata,
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chunks (id, content, tier, session_id, project_id, source, source_path,
                source_mtime, source_size, source_hash, created_at, token_count, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                chunk.id,
                chunk.content,
                chunk.tier.to_string(),
                chunk.session_id,
                chunk.project_id,
                chunk.source,
                chunk.source_path,
                chunk.source_mtime,
                chunk.source_size,
                chunk.source_hash,
                chunk.created_at.to_rfc3339(),
                chunk.token_count,
                chunk.metadata.as_ref().map(|m| m.to_string()),
            ],
        )?;
        Ok(chunk)
    }

    /// Token-overlap ranking: a full embedding provider is out of scope, and
    /// this keeps retrieval dependency-free and deterministic.
    pub async fn search(&self, req: SearchMemoryRequest) -> MemoryResult<Vec<MemorySearchResult>> {
        let conn = self.conn.lock().await;
        let mut sql = String::from("SELECT * FROM chunks WHERE 1 = 1");
        if req.tier.is_some() {
            sql.push_str(" AND tier = ?1");
        }
        let limit = req.limit.unwrap_or(20).max(1) as usize;

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<MemoryChunk> = if let Some(tier) = req.tier {
            stmt.query_map(params![tier.to_string()], row_to_chunk)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_chunk)?.collect::<Result<Vec<_>, _>>()?
        };

        let query_terms = term_set(&req.query);
        let mut scored: Vec<MemorySearchResult> = rows
            .into_iter()
            .filter(|c| req.project_id.as_deref().map_or(true, |p| c.project_id.as_deref() == Some(p)))
            .filter(|c| req.session_id.as_deref().map_or(true, |s| c.session_id.as_deref() == Some(s)))
            .map(|chunk| {
                let similarity = term_overlap(&query_terms, &term_set(&chunk.content));
                MemorySearchResult { chunk, similarity }
            })
            .filter(|r| r.similarity > 0.0)
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Assembles a tiered, token-budgeted context block for prompt injection.
    pub async fn build_context(
        &self,
        session_id: Option<&str>,
        project_id: Option<&str>,
        query: &str,
        config: &MemoryConfig,
    ) -> MemoryResult<(MemoryContext, MemoryRetrievalMeta)> {
        let mut remaining = config.token_budget;

        let current_session = if let Some(sid) = session_id {
            self.recent_chunks(sid, remaining).await?
        } else {
            Vec::new()
        };
        remaining -= current_session.iter().map(|c| c.token_count).sum::<i64>();

        let relevant_history = self
            .search(SearchMemoryRequest {
                query: query.to_string(),
                tier: Some(MemoryTier::Project),
                project_id: project_id.map(|p| p.to_string()),
                session_id: None,
                limit: Some(config.retrieval_k),
            })
            .await?;
        let relevant_history = take_within_budget(
            relevant_history.into_iter().map(|r| r.chunk).collect(),
            &mut remaining,
        );

        let project_facts = if let Some(pid) = project_id {
            self.facts_for_project(pid, remaining).await?
        } else {
            Vec::new()
        };
        remaining -= project_facts.iter().map(|c| c.token_count).sum::<i64>();

        let total_tokens = config.token_budget - remaining.max(0);
        let meta = MemoryRetrievalMeta {
            used: !current_session.is_empty() || !relevant_history.is_empty() || !project_facts.is_empty(),
            chunks_total: current_session.len() + relevant_history.len() + project_facts.len(),
            session_chunks: current_session.len(),
            history_chunks: relevant_history.len(),
            project_fact_chunks: project_facts.len(),
            score_min: None,
            score_max: None,
        };

        Ok((
            MemoryContext { current_session, relevant_history, project_facts, total_tokens },
            meta,
        ))
    }

    async fn recent_chunks(&self, session_id: &str, budget: i64) -> MemoryResult<Vec<MemoryChunk>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM chunks WHERE session_id = ?1 ORDER BY created_at DESC LIMIT 50",
        )?;
        let rows: Vec<MemoryChunk> =
            stmt.query_map(params![session_id], row_to_chunk)?.collect::<Result<Vec<_>, _>>()?;
        let mut remaining = budget;
        Ok(take_within_budget(rows, &mut remaining))
    }

    async fn facts_for_project(&self, project_id: &str, budget: i64) -> MemoryResult<Vec<MemoryChunk>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM chunks WHERE project_id = ?1 AND tier = 'global' ORDER BY created_at DESC LIMIT 20",
        )?;
        let rows: Vec<MemoryChunk> =
            stmt.query_map(params![project_id], row_to_chunk)?.collect::<Result<Vec<_>, _>>()?;
        let mut remaining = budget;
        Ok(take_within_budget(rows, &mut remaining))
    }

    pub async fn stats(&self) -> MemoryResult<MemoryStats> {
        let conn = self.conn.lock().await;
        let mut stats = MemoryStats {
            total_chunks: 0,
            session_chunks: 0,
            project_chunks: 0,
            global_chunks: 0,
            total_bytes: 0,
            session_bytes: 0,
            project_bytes: 0,
            global_bytes: 0,
            file_size: 0,
            last_cleanup: None,
        };
        let mut stmt = conn.prepare("SELECT tier, length(content) FROM chunks")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (tier, bytes) = row?;
            stats.total_chunks += 1;
            stats.total_bytes += bytes;
            match tier.as_str() {
                "session" => {
                    stats.session_chunks += 1;
                    stats.session_bytes += bytes;
                }
                "project" => {
                    stats.project_chunks += 1;
                    stats.project_bytes += bytes;
                }
                "global" => {
                    stats.global_chunks += 1;
                    stats.global_bytes += bytes;
                }
                _ => {}
            }
        }
        Ok(stats)
    }

    pub async fn cleanup_expired_sessions(&self, retention_days: i64) -> MemoryResult<i64> {
        let conn = self.conn.lock().await;
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).to_rfc3339();
        let deleted = conn.execute(
            "DELETE FROM chunks WHERE tier = 'session' AND created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted as i64)
    }

    pub async fn upsert_decomposition_pattern(
        &self,
        pattern: &waymark_types::memory::DecompositionPattern,
    ) -> MemoryResult<()> {
        let conn = self.conn.lock().await;
        let data = serde_json::to_string(pattern)?;
        conn.execute(
            "INSERT INTO decomposition_patterns (query_pattern, data) VALUES (?1, ?2)
             ON CONFLICT(query_pattern) DO UPDATE SET data = excluded.data",
            params![pattern.query_pattern, data],
        )?;
        Ok(())
    }

    pub async fn get_decomposition_pattern(
        &self,
        query_pattern: &str,
    ) -> MemoryResult<Option<waymark_types::memory::DecompositionPattern>> {
        let conn = self.conn.lock().await;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM decomposition_patterns WHERE query_pattern = ?1",
                params![query_pattern],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match data {
            Some(d) => Some(serde_json::from_str(&d)?),
            None => None,
        })
    }

    pub async fn record_strategy_performance(
        &self,
        perf: &waymark_types::memory::StrategyPerformance,
    ) -> MemoryResult<()> {
        let conn = self.conn.lock().await;
        let data = serde_json::to_string(perf)?;
        let strategy_key = perf.strategy.as_str();
        conn.execute(
            "INSERT INTO strategy_performance (user_id, strategy, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, strategy) DO UPDATE SET data = excluded.data",
            params![perf.user_id, strategy_key, data],
        )?;
        Ok(())
    }

    pub async fn get_strategy_performance(
        &self,
        user_id: &str,
        strategy: waymark_types::routing::Strategy,
    ) -> MemoryResult<Option<waymark_types::memory::StrategyPerformance>> {
        let conn = self.conn.lock().await;
        let strategy_key = strategy.as_str();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM strategy_performance WHERE user_id = ?1 AND strategy = ?2",
                params![user_id, strategy_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match data {
            Some(d) => Some(serde_json::from_str(&d)?),
            None => None,
        })
    }

    pub async fn record_failure_pattern(&self, pattern: &waymark_types::memory::FailurePattern) -> MemoryResult<()> {
        let conn = self.conn.lock().await;
        let data = serde_json::to_string(pattern)?;
        conn.execute(
            "INSERT INTO failure_patterns (name, data) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET data = excluded.data",
            params![pattern.name, data],
        )?;
        Ok(())
    }

    pub async fn list_failure_patterns(&self) -> MemoryResult<Vec<waymark_types::memory::FailurePattern>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT data FROM failure_patterns")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut patterns = Vec::new();
        for row in rows {
            patterns.push(serde_json::from_str(&row?)?);
        }
        Ok(patterns)
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<MemoryChunk> {
    let tier_str: String = row.get("tier")?;
    let created_at: String = row.get("created_at")?;
    let metadata: Option<String> = row.get("metadata")?;
    Ok(MemoryChunk {
        id: row.get("id")?,
        content: row.get("content")?,
        tier: match tier_str.as_str() {
            "session" => MemoryTier::Session,
            "project" => MemoryTier::Project,
            _ => MemoryTier::Global,
        },
        session_id: row.get("session_id")?,
        project_id: row.get("project_id")?,
        source: row.get("source")?,
        source_path: row.get("source_path")?,
        source_mtime: row.get("source_mtime")?,
        source_size: row.get("source_size")?,
        source_hash: row.get("source_hash")?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        token_count: row.get("token_count")?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}

fn estimate_tokens(content: &str) -> i64 {
    (content.len() as i64 / 4).max(1)
}

fn term_set(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase().split_whitespace().map(|s| s.to_string()).collect()
}

fn term_overlap(query: &std::collections::HashSet<String>, candidate: &std::collections::HashSet<String>) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let intersection = query.intersection(candidate).count() as f64;
    intersection / query.len() as f64
}

fn take_within_budget(chunks: Vec<MemoryChunk>, remaining: &mut i64) -> Vec<MemoryChunk> {
    let mut out = Vec::new();
    for chunk in chunks {
        if *remaining <= 0 {
            break;
        }
        *remaining -= chunk.token_count;
        out.push(chunk);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_searches_chunks_by_term_overlap() {
        let store = MemoryStore::open_in_memory().unwrap();
        store
            .store_chunk(StoreMessageRequest {
                content: "the deploy pipeline failed on the staging cluster".to_string(),
                tier: MemoryTier::Project,
                session_id: None,
                project_id: Some("proj-1".to_string()),
                source: "assistant_response".to_string(),
                source_path: None,
                source_mtime: None,
                source_size: None,
                source_hash: None,
                metadata: None,
            })
            .await
            .unwrap();

        let results = store
            .search(SearchMemoryRequest {
                query: "deploy pipeline staging".to_string(),
                tier: Some(MemoryTier::Project),
                project_id: Some("proj-1".to_string()),
                session_id: None,
                limit: Some(5),
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].similarity > 0.0);
    }

    #[tokio::test]
    async fn build_context_respects_token_budget() {
        let store = MemoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .store_chunk(StoreMessageRequest {
                    content: format!("session note number {i} about the current task"),
                    tier: MemoryTier::Session,
                    session_id: Some("sess-1".to_string()),
                    project_id: None,
                    source: "user_message".to_string(),
                    source_path: None,
                    source_mtime: None,
                    source_size: None,
                    source_hash: None,
                    metadata: None,
                })
                .await
                .unwrap();
        }
        let mut config = MemoryConfig::default();
        config.token_budget = 5;
        let (context, meta) = store.build_context(Some("sess-1"), None, "task", &config).await.unwrap();
        assert!(context.total_tokens <= 10);
        assert!(meta.used);
    }

    #[tokio::test]
    async fn decomposition_pattern_round_trips() {
        let store = MemoryStore::open_in_memory().unwrap();
        let pattern = waymark_types::memory::DecompositionPattern {
            query_pattern: "refactor-auth-module".to_string(),
            subtasks: vec!["extract interfaces".to_string(), "migrate callers".to_string()],
            strategy: waymark_types::routing::Strategy::Dag,
            success_rate: 0.8,
            avg_duration_ms: 12000.0,
            total_runs: 4,
            last_used: Utc::now(),
        };
        store.upsert_decomposition_pattern(&pattern).await.unwrap();
        let fetched = store.get_decomposition_pattern("refactor-auth-module").await.unwrap().unwrap();
        assert_eq!(fetched.total_runs, 4);
    }

    #[tokio::test]
    async fn nearest_cases_ranks_the_recorded_case_first() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.record_case("migrate the auth service to jwt", "dag", 1.0).await.unwrap();
        store.record_case("summarize the quarterly earnings report", "simple_task", 1.0).await.unwrap();

        let results = store.nearest_cases("migrate the auth module to use jwt tokens", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].case.plan_summary, "dag");
    }

    #[tokio::test]
    async fn nearest_cases_empty_before_any_case_recorded() {
        let store = MemoryStore::open_in_memory().unwrap();
        let results = store.nearest_cases("anything", 3).await.unwrap();
        assert!(results.is_empty());
    }
}
