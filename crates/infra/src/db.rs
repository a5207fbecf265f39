//! SQLite wiring shared by the durable stores (pool setup, column codecs).

use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

/// Open (creating if missing) a file-backed SQLite database.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid SQLite URL {database_url:?}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open SQLite database at {database_url:?}"))
}

/// Private in-memory database for tests/dev.
///
/// Every connection to `sqlite::memory:` is a separate database, so the pool is
/// pinned to one connection that never expires.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .context("failed to open in-memory SQLite database")
}

/// Human-readable description of a sqlx failure, prefixed with the operation.
pub(crate) fn describe_sqlx_error(operation: &str, err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => format!(
                "database error in {operation} (code {code}): {}",
                db_err.message()
            ),
            None => format!("database error in {operation}: {}", db_err.message()),
        },
        sqlx::Error::PoolClosed => format!("connection pool closed in {operation}"),
        sqlx::Error::PoolTimedOut => format!("timed out waiting for a connection in {operation}"),
        other => format!("sqlx error in {operation}: {other}"),
    }
}

/// Timestamps are stored at microsecond precision in a fixed-width format so
/// that TEXT ordering matches time ordering.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp in column {column}: {e}"))
}

pub(crate) fn encode_decimal(value: Decimal) -> String {
    value.to_string()
}

pub(crate) fn decode_decimal(column: &str, raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|e| format!("invalid decimal in column {column}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_text_sorts_chronologically() {
        let a = Utc::now().trunc_subsecs(6);
        let b = a + chrono::Duration::microseconds(1);
        let c = a + chrono::Duration::seconds(1);
        assert!(encode_ts(a) < encode_ts(b));
        assert!(encode_ts(b) < encode_ts(c));
        assert_eq!(decode_ts("t", &encode_ts(a)).unwrap(), a);
    }

    #[test]
    fn decimals_keep_their_scale() {
        let d = Decimal::new(250, 2);
        assert_eq!(encode_decimal(d), "2.50");
        assert_eq!(decode_decimal("q", "2.50").unwrap(), d);
        assert!(decode_decimal("q", "two").is_err());
    }
}
