//! SQLite storage implementation
//!
//! Several crawler processes may open the same database file. Each
//! `SqliteDatastore` carries its own claim token; claims are conditional
//! updates keyed on the sentinel token, so a domain is never handed to two
//! stores at once.

use crate::config::DatastoreConfig;
use crate::fetcher::FetchResult;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    Datastore, DispatchStore, LinkHistory, Segment, StoreError, StoreResult,
};
use crate::storage::{never_crawled, UNCLAIMED_TOKEN};
use crate::url::{CrawlUrl, LinkKey};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

/// A row of `domain_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainRecord {
    pub domain: String,
    pub claim_token: Uuid,
    pub claim_time: DateTime<Utc>,
    pub dispatched: bool,
    pub priority: i64,
    pub excluded: bool,
    pub exclude_reason: Option<String>,
}

impl DomainRecord {
    pub fn is_claimed(&self) -> bool {
        self.claim_token != UNCLAIMED_TOKEN
    }
}

/// The current (newest) state of one link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub key: LinkKey,
    pub time: DateTime<Utc>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub robots_excluded: bool,
    pub mime: Option<String>,
}

impl LinkRecord {
    pub fn is_crawled(&self) -> bool {
        self.time != never_crawled()
    }
}

pub(crate) fn timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{}: {}", text, e)))
}

fn parse_token(text: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(text).map_err(|e| StoreError::Database(format!("bad claim token {}: {}", text, e)))
}

/// SQLite storage backend
pub struct SqliteDatastore {
    conn: Mutex<Connection>,
    token: Uuid,
    config: DatastoreConfig,
    /// Domains claimed in the last batch but not yet handed out
    claimed: Mutex<VecDeque<String>>,
}

impl SqliteDatastore {
    /// Opens the database named in the configuration
    pub fn open(config: &DatastoreConfig) -> StoreResult<Self> {
        Self::new(Path::new(&config.database_path), config.clone())
    }

    /// Opens or creates a database file with a fresh claim token
    pub fn new(path: &Path, config: DatastoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self::with_connection(conn, config))
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(config: DatastoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self::with_connection(conn, config))
    }

    fn with_connection(conn: Connection, config: DatastoreConfig) -> Self {
        let token = Uuid::new_v4();
        tracing::debug!(token = %token, "Opened datastore");
        Self {
            conn: Mutex::new(conn),
            token,
            config,
            claimed: Mutex::new(VecDeque::new()),
        }
    }

    /// This store's claim token
    pub fn token(&self) -> Uuid {
        self.token
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn claimed(&self) -> StoreResult<MutexGuard<'_, VecDeque<String>>> {
        self.claimed.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ===== Administration =====

    /// Adds a domain if it is not yet known
    ///
    /// Returns `true` if the domain was created.
    pub fn add_domain(&self, domain: &str, priority: i64) -> StoreResult<bool> {
        let conn = self.conn()?;
        insert_domain(&conn, domain, priority)
    }

    /// Adds a link (and its domain) as not yet crawled
    pub fn seed(&self, url: &CrawlUrl) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_domain(&conn, url.domain(), 0)?;
        insert_uncrawled(&conn, url)?;
        Ok(())
    }

    /// Marks a domain excluded from crawling, creating it if needed
    pub fn exclude_domain(&self, domain: &str, reason: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        insert_domain(&conn, domain, 0)?;
        conn.execute(
            "UPDATE domain_info SET excluded = 1, exclude_reason = ?1 WHERE dom = ?2",
            params![reason, domain],
        )?;
        Ok(())
    }

    pub fn domain_record(&self, domain: &str) -> StoreResult<Option<DomainRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT dom, claim_tok, claim_time, dispatched, priority, excluded, exclude_reason
                 FROM domain_info WHERE dom = ?1",
                params![domain],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, Option<String>>(6)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(domain, token, time, dispatched, priority, excluded, exclude_reason)| {
                Ok(DomainRecord {
                    domain,
                    claim_token: parse_token(&token)?,
                    claim_time: parse_timestamp(&time)?,
                    dispatched,
                    priority,
                    excluded,
                    exclude_reason,
                })
            },
        )
        .transpose()
    }

    /// The newest history row of every link of a domain
    pub fn link_records(&self, domain: &str) -> StoreResult<Vec<LinkRecord>> {
        let conn = self.conn()?;
        // SQLite takes bare columns from the row that supplied MAX(time)
        let mut stmt = conn.prepare(
            "SELECT subdom, path, proto, MAX(time), stat, err, robot_ex, mime
             FROM links WHERE dom = ?1
             GROUP BY subdom, path, proto
             ORDER BY subdom, path, proto",
        )?;

        let rows = stmt
            .query_map(params![domain], |row| {
                Ok((
                    LinkKey {
                        subdomain: row.get(0)?,
                        path: row.get(1)?,
                        protocol: row.get(2)?,
                    },
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<u16>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, bool>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(key, time, status, error, robots_excluded, mime)| {
                Ok(LinkRecord {
                    key,
                    time: parse_timestamp(&time)?,
                    status,
                    error,
                    robots_excluded,
                    mime,
                })
            })
            .collect()
    }

    /// Number of links currently queued for a domain
    pub fn segment_len(&self, domain: &str) -> StoreResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM segments WHERE dom = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ===== Claims =====

    fn claim_batch(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let unclaimed = UNCLAIMED_TOKEN.to_string();
        let ours = self.token.to_string();
        let now = timestamp(&Utc::now());

        let candidates: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT q.dom FROM domains_to_crawl q
                 JOIN domain_info d ON d.dom = q.dom
                 WHERE q.crawler_token = ?1
                   AND d.claim_tok = ?1
                   AND d.dispatched = 1
                   AND d.excluded = 0
                 ORDER BY q.priority DESC, q.queued_at
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                params![unclaimed, self.config.claim_batch_size as i64],
                |row| row.get(0),
            )?;
            rows.collect::<Result<_, _>>()?
        };

        let mut won = Vec::with_capacity(candidates.len());
        for domain in candidates {
            let changed = tx.execute(
                "UPDATE domain_info SET claim_tok = ?1, claim_time = ?2
                 WHERE dom = ?3 AND claim_tok = ?4 AND dispatched = 1 AND excluded = 0",
                params![ours, now, domain, unclaimed],
            )?;
            if changed == 1 {
                tx.execute(
                    "UPDATE domains_to_crawl SET crawler_token = ?1 WHERE dom = ?2",
                    params![ours, domain],
                )?;
                won.push(domain);
            }
        }

        tx.commit()?;
        Ok(won)
    }

    fn release(&self, domains: &[String]) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let unclaimed = UNCLAIMED_TOKEN.to_string();
        let ours = self.token.to_string();
        let now = timestamp(&Utc::now());

        let mut released = 0;
        for domain in domains {
            let changed = tx.execute(
                "UPDATE domain_info SET claim_tok = ?1, claim_time = ?2, dispatched = 0
                 WHERE dom = ?3 AND claim_tok = ?4",
                params![unclaimed, now, domain, ours],
            )?;
            if changed > 0 {
                tx.execute("DELETE FROM segments WHERE dom = ?1", params![domain])?;
                tx.execute("DELETE FROM domains_to_crawl WHERE dom = ?1", params![domain])?;
                released += 1;
            }
        }

        tx.commit()?;
        Ok(released)
    }

    fn drain_segment(&self, domain: &str) -> StoreResult<Vec<LinkKey>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT claim_tok FROM domain_info WHERE dom = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        if owner.as_deref() != Some(self.token.to_string().as_str()) {
            tracing::warn!(domain, "Segment requested for a domain this store does not hold");
            return Ok(Vec::new());
        }

        let keys: Vec<LinkKey> = {
            let mut stmt = tx.prepare(
                "SELECT subdom, path, proto FROM segments WHERE dom = ?1
                 ORDER BY subdom, path, proto",
            )?;
            let rows = stmt.query_map(params![domain], |row| {
                Ok(LinkKey {
                    subdomain: row.get(0)?,
                    path: row.get(1)?,
                    protocol: row.get(2)?,
                })
            })?;
            rows.collect::<Result<_, _>>()?
        };

        tx.execute("DELETE FROM segments WHERE dom = ?1", params![domain])?;
        tx.commit()?;
        Ok(keys)
    }
}

fn insert_domain(conn: &Connection, domain: &str, priority: i64) -> StoreResult<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO domain_info
            (dom, claim_tok, claim_time, dispatched, priority, excluded)
         VALUES (?1, ?2, ?3, 0, ?4, 0)",
        params![
            domain,
            UNCLAIMED_TOKEN.to_string(),
            timestamp(&never_crawled()),
            priority
        ],
    )?;
    Ok(changed > 0)
}

fn insert_uncrawled(conn: &Connection, url: &CrawlUrl) -> StoreResult<bool> {
    let key = url.key();
    let changed = conn.execute(
        "INSERT OR IGNORE INTO links (dom, subdom, path, proto, time, robot_ex)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        params![
            url.domain(),
            key.subdomain,
            key.path,
            key.protocol,
            timestamp(&never_crawled())
        ],
    )?;
    Ok(changed > 0)
}

#[async_trait]
impl Datastore for SqliteDatastore {
    async fn claim_new_host(&self) -> StoreResult<Option<String>> {
        if let Some(domain) = self.claimed()?.pop_front() {
            return Ok(Some(domain));
        }

        let batch = self.claim_batch()?;
        if !batch.is_empty() {
            tracing::debug!(count = batch.len(), "Claimed domain batch");
        }

        let mut claimed = self.claimed()?;
        claimed.extend(batch);
        Ok(claimed.pop_front())
    }

    async fn unclaim_host(&self, domain: &str) -> StoreResult<()> {
        self.claimed()?.retain(|d| d != domain);
        self.release(&[domain.to_string()])?;
        Ok(())
    }

    async fn links_for_host(&self, domain: &str) -> StoreResult<Segment> {
        let keys = self.drain_segment(domain)?;

        let mut links = Vec::with_capacity(keys.len());
        for key in keys {
            match CrawlUrl::from_parts(domain, &key.subdomain, &key.path, &key.protocol) {
                Ok(url) => links.push(url),
                Err(e) => tracing::warn!(domain, path = %key.path, error = %e, "Dropping unparseable segment link"),
            }
        }

        Ok(Segment::new(domain, links))
    }

    async fn store_url_fetch_results(&self, result: &FetchResult) -> StoreResult<()> {
        let conn = self.conn()?;
        let key = result.url.key();
        conn.execute(
            "INSERT OR REPLACE INTO links
                (dom, subdom, path, proto, time, stat, err, robot_ex, mime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                result.url.domain(),
                key.subdomain,
                key.path,
                key.protocol,
                timestamp(&result.fetch_time),
                result.status(),
                result.fetch_error,
                result.excluded_by_robots,
                result.mime_type(),
            ],
        )?;
        Ok(())
    }

    async fn store_parsed_url(&self, url: &CrawlUrl, origin: &FetchResult) -> StoreResult<()> {
        let conn = self.conn()?;

        let known = conn
            .query_row(
                "SELECT 1 FROM domain_info WHERE dom = ?1",
                params![url.domain()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        if !known {
            if !self.config.add_new_domains {
                tracing::trace!(url = %url, "Dropping link to unknown domain");
                return Ok(());
            }
            if insert_domain(&conn, url.domain(), 0)? {
                tracing::debug!(domain = url.domain(), from = %origin.url, "Discovered new domain");
            }
        }

        insert_uncrawled(&conn, url)?;
        Ok(())
    }

    async fn unclaim_all(&self) -> StoreResult<()> {
        self.claimed()?.clear();

        let held: Vec<String> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare("SELECT dom FROM domain_info WHERE claim_tok = ?1")?;
            let rows = stmt.query_map(params![self.token.to_string()], |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        let released = self.release(&held)?;
        if released > 0 {
            tracing::info!(count = released, "Released all held domains");
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchStore for SqliteDatastore {
    async fn undispatched_domains(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT dom FROM domain_info
             WHERE claim_tok = ?1 AND dispatched = 0 AND excluded = 0
             ORDER BY priority DESC, dom",
        )?;
        let rows = stmt.query_map(params![UNCLAIMED_TOKEN.to_string()], |row| row.get(0))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    async fn link_history(&self, domain: &str) -> StoreResult<Vec<LinkHistory>> {
        let rows: Vec<(LinkKey, String)> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT subdom, path, proto, time FROM links WHERE dom = ?1
                 ORDER BY subdom, path, proto, time",
            )?;
            let rows = stmt.query_map(params![domain], |row| {
                Ok((
                    LinkKey {
                        subdomain: row.get(0)?,
                        path: row.get(1)?,
                        protocol: row.get(2)?,
                    },
                    row.get(3)?,
                ))
            })?;
            rows.collect::<Result<_, _>>()?
        };

        rows.into_iter()
            .map(|(key, time)| {
                Ok(LinkHistory {
                    key,
                    time: parse_timestamp(&time)?,
                })
            })
            .collect()
    }

    async fn write_segment(&self, domain: &str, links: &[LinkKey]) -> StoreResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let unclaimed = UNCLAIMED_TOKEN.to_string();

        let changed = tx.execute(
            "UPDATE domain_info SET dispatched = 1
             WHERE dom = ?1 AND claim_tok = ?2 AND dispatched = 0 AND excluded = 0",
            params![domain, unclaimed],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        tx.execute("DELETE FROM segments WHERE dom = ?1", params![domain])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO segments (dom, subdom, path, proto) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in links {
                stmt.execute(params![domain, link.subdomain, link.path, link.protocol])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO domains_to_crawl (dom, priority, crawler_token, queued_at)
             SELECT dom, priority, ?2, ?3 FROM domain_info WHERE dom = ?1",
            params![domain, unclaimed, timestamp(&Utc::now())],
        )?;

        tx.commit()?;
        Ok(true)
    }
}
