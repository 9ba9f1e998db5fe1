//! Database schema definitions
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision in
//! UTC, so text order is time order.

/// SQL schema for the shared crawl database
pub const SCHEMA_SQL: &str = r#"
-- Per-domain crawl metadata and claim state
CREATE TABLE IF NOT EXISTS domain_info (
    dom TEXT PRIMARY KEY,
    claim_tok TEXT NOT NULL,
    claim_time TEXT NOT NULL,
    dispatched INTEGER NOT NULL DEFAULT 0,
    priority INTEGER NOT NULL DEFAULT 0,
    excluded INTEGER NOT NULL DEFAULT 0,
    exclude_reason TEXT
);

CREATE INDEX IF NOT EXISTS idx_domain_info_claim
    ON domain_info(claim_tok, dispatched, excluded);

-- Append-only link history; the newest row per tuple is current
CREATE TABLE IF NOT EXISTS links (
    dom TEXT NOT NULL,
    subdom TEXT NOT NULL,
    path TEXT NOT NULL,
    proto TEXT NOT NULL,
    time TEXT NOT NULL,
    stat INTEGER,
    err TEXT,
    robot_ex INTEGER NOT NULL DEFAULT 0,
    mime TEXT,
    PRIMARY KEY (dom, subdom, path, proto, time)
);

-- Links queued for the current dispatch cycle of a domain
CREATE TABLE IF NOT EXISTS segments (
    dom TEXT NOT NULL,
    subdom TEXT NOT NULL,
    path TEXT NOT NULL,
    proto TEXT NOT NULL,
    PRIMARY KEY (dom, subdom, path, proto)
);

-- Dispatch queue: domains with a segment waiting to be fetched
CREATE TABLE IF NOT EXISTS domains_to_crawl (
    dom TEXT PRIMARY KEY,
    priority INTEGER NOT NULL DEFAULT 0,
    crawler_token TEXT NOT NULL,
    queued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domains_to_crawl_priority
    ON domains_to_crawl(priority DESC, queued_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
