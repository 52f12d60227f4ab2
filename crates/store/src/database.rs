//! `SQLite` connection and statement execution.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection as SqliteConnection, params_from_iter};
use stratus_orm::{Param, Query, Row, Value, format_timestamp, rewrite_placeholders};
use tracing::instrument;

use crate::config::ConnectOptions;
use crate::error::Result;
use crate::kit::Kit;
use crate::storage_error;
use crate::traits::Backend;

/// Executes compiled statements.
///
/// Implemented by [`Database`] for auto-committed statements and by
/// [`Txn`](crate::Txn) for statements inside a transaction.
pub trait Connection {
    /// Runs a statement that returns rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`](crate::Error::Canceled) if the kit is cancelled
    /// and [`Error::Storage`](crate::Error::Storage) if the driver fails.
    fn query(&self, kit: &Kit, query: &Query) -> Result<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Canceled`](crate::Error::Canceled) if the kit is cancelled
    /// and [`Error::Storage`](crate::Error::Storage) if the driver fails.
    fn exec(&self, kit: &Kit, query: &Query) -> Result<usize>;
}

/// A shared `SQLite` database.
///
/// The connection is guarded by a mutex since `rusqlite::Connection` isn't
/// `Sync`. Inside [`Database::run_in_transaction`] the lock is held for the
/// whole callback, so the callback must use the transaction it is given rather
/// than the database.
#[derive(Debug, Clone)]
pub struct Database {
    pub(crate) conn: Arc<Mutex<SqliteConnection>>,
    pub(crate) slow: Duration,
}

impl Backend for Database {
    type ConnectOptions = ConnectOptions;

    #[instrument(skip_all, fields(database = %options.database))]
    fn connect_with(options: Self::ConnectOptions) -> anyhow::Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let slow = options.slow_request();
        let conn = SqliteConnection::open(&options.database).context("failed to open SQLite database")?;
        conn.create_scalar_function("now", 0, FunctionFlags::SQLITE_UTF8, |_| Ok(format_timestamp(Utc::now())))
            .context("failed to register now()")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            slow,
        })
    }
}

impl Database {
    /// Runs one or more statements without parameters, such as schema DDL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if any statement fails.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.lock().execute_batch(sql).context("failed to execute batch")?;
        Ok(())
    }
}

impl Connection for Database {
    fn query(&self, kit: &Kit, query: &Query) -> Result<Vec<Row>> {
        let conn = self.conn.lock();
        query_rows(&conn, self.slow, kit, query)
    }

    fn exec(&self, kit: &Kit, query: &Query) -> Result<usize> {
        let conn = self.conn.lock();
        exec_statement(&conn, self.slow, kit, query)
    }
}

#[instrument(skip_all, fields(rid = %kit.rid))]
pub(crate) fn query_rows(conn: &SqliteConnection, slow: Duration, kit: &Kit, query: &Query) -> Result<Vec<Row>> {
    kit.check()?;
    let (sql, params) = bind(query)?;
    tracing::debug!("executing query: {sql}");

    let started = Instant::now();
    let mut stmt = conn.prepare(&sql).context("failed to prepare statement")?;
    let column_names: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

    let mut rows = stmt.query(params_from_iter(params.iter())).context("failed to execute query")?;
    let mut result = Vec::new();
    while let Some(row) = rows.next().context("failed to fetch row")? {
        let mut fetched = Row::new();
        for (i, name) in column_names.iter().enumerate() {
            let value = row.get_ref(i).context("failed to get column value")?;
            fetched.insert(name.clone(), from_sql(value)?);
        }
        result.push(fetched);
    }

    warn_if_slow(kit, &sql, started.elapsed(), slow);
    Ok(result)
}

#[instrument(skip_all, fields(rid = %kit.rid))]
pub(crate) fn exec_statement(conn: &SqliteConnection, slow: Duration, kit: &Kit, query: &Query) -> Result<usize> {
    kit.check()?;
    let (sql, params) = bind(query)?;
    tracing::debug!("executing statement: {sql}");

    let started = Instant::now();
    let mut stmt = conn.prepare(&sql).context("failed to prepare statement")?;
    let affected = stmt.execute(params_from_iter(params.iter())).context("failed to execute statement")?;

    warn_if_slow(kit, &sql, started.elapsed(), slow);
    Ok(affected)
}

fn warn_if_slow(kit: &Kit, sql: &str, elapsed: Duration, slow: Duration) {
    if elapsed > slow {
        tracing::warn!(
            rid = %kit.rid,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "slow statement: {sql}"
        );
    }
}

/// Rewrites named placeholders to positional ones and collects their values in
/// order. A list parameter expands to one `?` per element.
fn bind(query: &Query) -> Result<(String, Vec<SqlValue>)> {
    let mut values: Vec<&Value> = Vec::new();
    let mut missing: Option<String> = None;

    let sql = rewrite_placeholders(&query.sql, |name| match query.params.get(name) {
        Some(Param::Value(value)) => {
            values.push(value);
            Some("?".to_string())
        }
        Some(Param::List(list)) => {
            values.extend(list);
            Some(vec!["?"; list.len()].join(", "))
        }
        None => {
            missing.get_or_insert_with(|| name.to_string());
            None
        }
    });

    if let Some(name) = missing {
        return Err(storage_error!("no value bound for placeholder `:{name}`"));
    }
    let values = values.into_iter().map(to_sql).collect::<Result<Vec<_>>>()?;
    Ok((sql, values))
}

fn to_sql(value: &Value) -> Result<SqlValue> {
    let converted = match value {
        Value::Bool(v) => v.map_or(SqlValue::Null, |b| SqlValue::Integer(i64::from(b))),
        Value::TinyInt(v) => v.map_or(SqlValue::Null, |i| SqlValue::Integer(i64::from(i))),
        Value::SmallInt(v) => v.map_or(SqlValue::Null, |i| SqlValue::Integer(i64::from(i))),
        Value::Int(v) => v.map_or(SqlValue::Null, |i| SqlValue::Integer(i64::from(i))),
        Value::BigInt(v) => v.map_or(SqlValue::Null, SqlValue::Integer),
        Value::TinyUnsigned(v) => v.map_or(SqlValue::Null, |u| SqlValue::Integer(i64::from(u))),
        Value::SmallUnsigned(v) => v.map_or(SqlValue::Null, |u| SqlValue::Integer(i64::from(u))),
        Value::Unsigned(v) => v.map_or(SqlValue::Null, |u| SqlValue::Integer(i64::from(u))),
        Value::BigUnsigned(v) => v.map_or(SqlValue::Null, |u| SqlValue::Integer(u as i64)),
        Value::Float(v) => v.map_or(SqlValue::Null, |f| SqlValue::Real(f64::from(f))),
        Value::Double(v) => v.map_or(SqlValue::Null, SqlValue::Real),
        Value::Char(v) => v.map_or(SqlValue::Null, |c| SqlValue::Text(c.to_string())),
        Value::String(v) => v.as_ref().map_or(SqlValue::Null, |s| SqlValue::Text(s.as_ref().clone())),
        Value::Bytes(v) => v.as_ref().map_or(SqlValue::Null, |b| SqlValue::Blob(b.as_ref().clone())),
        Value::Json(v) => match v {
            Some(json) => SqlValue::Text(serde_json::to_string(json.as_ref()).context("failed to encode JSON")?),
            None => SqlValue::Null,
        },
        Value::ChronoDateTimeUtc(v) => v.as_ref().map_or(SqlValue::Null, |ts| SqlValue::Text(format_timestamp(**ts))),
        Value::ChronoDate(v) => v.as_ref().map_or(SqlValue::Null, |d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
        Value::ChronoDateTime(v) => v
            .as_ref()
            .map_or(SqlValue::Null, |ts| SqlValue::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())),
        other => return Err(storage_error!("unsupported parameter type: {other:?}")),
    };
    Ok(converted)
}

fn from_sql(value: ValueRef<'_>) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::String(None)),
        ValueRef::Integer(i) => Ok(Value::BigInt(Some(i))),
        ValueRef::Real(f) => Ok(Value::Double(Some(f))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Value::from(s.to_string()))
        }
        ValueRef::Blob(b) => Ok(Value::from(b.to_vec())),
    }
}
