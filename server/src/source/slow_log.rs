//! MySQL slow-query-log source
//!
//! Parses the canonical block format written by `mysqld --slow-query-log`:
//!
//! ```text
//! # Time: 2019-03-16T23:00:35.116219Z
//! # User@Host: dbadmin2[dbadmin2] @  [172.16.2.208]  Id: 311270893
//! # Query_time: 0.000218  Lock_time: 0.000072 Rows_sent: 6  Rows_examined: 12
//! SET timestamp=1552777235;
//! SELECT ...;
//! ```
//!
//! The file is re-read on every window. Malformed entries are skipped with a
//! warning so one bad block never stalls the job.

use std::path::PathBuf;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;

use super::{QuerySource, SourceError};
use crate::data::types::UserQuery;
use crate::utils::time::epoch_secs_to_zoned;

static USER_HOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^# User@Host:\s*(?P<user>\S+)\s*@\s*(?P<host>[^\[\s]*)\s*\[(?P<ip>[^\]]*)\](?:\s+Id:\s*(?P<id>\d+))?",
    )
    .expect("Invalid regex")
});

static TIMINGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^# Query_time:\s*(?P<qt>[\d.]+)\s+Lock_time:\s*(?P<lt>[\d.]+)\s+Rows_sent:\s*(?P<rs>\d+)\s+Rows_examined:\s*(?P<re>\d+)",
    )
    .expect("Invalid regex")
});

static SET_TIMESTAMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SET timestamp=(?P<ts>\d+);\s*$").expect("Invalid regex"));

pub struct SlowLogSource {
    path: PathBuf,
}

impl SlowLogSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl QuerySource for SlowLogSource {
    async fn get_queries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserQuery>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let queries: Vec<UserQuery> = parse_slow_log(&text)
            .into_iter()
            .filter(|q| q.log_time >= start && q.log_time < end)
            .collect();

        tracing::debug!(
            path = %self.path.display(),
            count = queries.len(),
            "Read slow-log window"
        );
        Ok(queries)
    }
}

#[derive(Default)]
struct Entry {
    start_line: usize,
    header_time: Option<DateTime<FixedOffset>>,
    user_host: String,
    ip_address: String,
    connection_id: String,
    timings: Option<(f64, f64, i64, i64)>,
    timestamp: Option<DateTime<FixedOffset>>,
    body: Vec<String>,
}

impl Entry {
    fn finish(self) -> Option<UserQuery> {
        let query = self.body.join("\n");
        let query = query.trim().trim_end_matches(';').trim_end();
        if query.is_empty() {
            tracing::warn!(line = self.start_line, "Slow-log entry without query text");
            return None;
        }

        let Some(log_time) = self.timestamp.or(self.header_time) else {
            tracing::warn!(line = self.start_line, "Slow-log entry without timestamp");
            return None;
        };
        let Some((query_time, lock_time, rows_sent, rows_examined)) = self.timings else {
            tracing::warn!(line = self.start_line, "Slow-log entry without timings");
            return None;
        };

        Some(UserQuery {
            id: None,
            user_host: self.user_host,
            ip_address: self.ip_address,
            connection_id: self.connection_id,
            query: query.to_string(),
            query_time,
            lock_time,
            rows_sent,
            rows_examined,
            log_time,
            digest_hash: None,
        })
    }
}

/// Parse every complete entry of a slow-query log
pub fn parse_slow_log(text: &str) -> Vec<UserQuery> {
    let mut queries = Vec::new();
    let mut current: Option<Entry> = None;
    // `# Time:` is only written when the second changes, later entries inherit it
    let mut last_time: Option<DateTime<FixedOffset>> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(rest) = line.strip_prefix("# Time:") {
            if let Some(entry) = current.take() {
                queries.extend(entry.finish());
            }
            last_time = parse_header_time(rest.trim());
            continue;
        }

        if let Some(caps) = USER_HOST_RE.captures(line) {
            if let Some(entry) = current.take() {
                queries.extend(entry.finish());
            }
            let user = &caps["user"];
            let host = &caps["host"];
            current = Some(Entry {
                start_line: line_no,
                header_time: last_time,
                user_host: if host.is_empty() {
                    user.to_string()
                } else {
                    format!("{} @ {}", user, host)
                },
                ip_address: caps["ip"].to_string(),
                connection_id: caps
                    .name("id")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default(),
                ..Default::default()
            });
            continue;
        }

        let Some(entry) = current.as_mut() else {
            // Server banner and column header lines before the first entry
            continue;
        };

        if let Some(caps) = TIMINGS_RE.captures(line) {
            entry.timings = parse_timings(&caps);
            if entry.timings.is_none() {
                tracing::warn!(line = line_no, "Unparsable slow-log timings");
            }
        } else if let Some(caps) = SET_TIMESTAMP_RE.captures(line) {
            entry.timestamp = caps["ts"].parse::<i64>().ok().and_then(epoch_secs_to_zoned);
        } else {
            // Other metadata lines (Schema, Bytes_sent, ...) and the default database switch
            let metadata =
                line.starts_with('#') || (entry.body.is_empty() && is_use_statement(line));
            if !metadata {
                entry.body.push(line.to_string());
            }
        }
    }

    if let Some(entry) = current.take() {
        queries.extend(entry.finish());
    }
    queries
}

fn parse_timings(caps: &regex::Captures<'_>) -> Option<(f64, f64, i64, i64)> {
    Some((
        caps["qt"].parse().ok()?,
        caps["lt"].parse().ok()?,
        caps["rs"].parse().ok()?,
        caps["re"].parse().ok()?,
    ))
}

/// `2019-03-16T23:00:35.116219Z` (5.7+) or `190316 23:00:35` (5.6)
fn parse_header_time(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts);
    }
    chrono::NaiveDateTime::parse_from_str(value, "%y%m%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

fn is_use_statement(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("use "))
        && trimmed.ends_with(';')
}
