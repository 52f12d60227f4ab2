//! Batch identifier allocation.

use std::collections::HashMap;

use parking_lot::Mutex;
use stratus_orm::{FetchValue, Query, invalid_parameter};

use crate::database::Connection;
use crate::error::{Error, Result};
use crate::kit::Kit;

/// Largest batch a single call may reserve.
pub const MAX_BATCH: usize = 1000;

/// Reserves blocks of unique identifiers per resource kind.
pub trait IdAllocator: Send + Sync {
    /// Reserves `n` identifiers for `kind`, in ascending order.
    ///
    /// Runs on `conn`, so a reservation made inside a transaction is released if
    /// the transaction rolls back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Orm`] with `InvalidParameter` when `n` is zero or above
    /// [`MAX_BATCH`], and [`Error::AllocationExhausted`] when the counter cannot
    /// advance.
    fn allocate(&self, conn: &dyn Connection, kit: &Kit, kind: &str, n: usize) -> Result<Vec<String>>;
}

/// Allocator backed by the `id_generator` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlIdAllocator;

impl SqlIdAllocator {
    /// Creates the counter table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the statement fails.
    pub fn migrate(conn: &dyn Connection, kit: &Kit) -> Result<()> {
        let ddl = Query::raw(
            "CREATE TABLE IF NOT EXISTS id_generator (resource TEXT PRIMARY KEY, max_id INTEGER NOT NULL)",
        );
        conn.exec(kit, &ddl)?;
        Ok(())
    }
}

impl IdAllocator for SqlIdAllocator {
    fn allocate(&self, conn: &dyn Connection, kit: &Kit, kind: &str, n: usize) -> Result<Vec<String>> {
        check_batch(n)?;
        let step = i64::try_from(n).map_err(|err| invalid_parameter!("batch size {n} is too large: {err}"))?;

        let reserve = Query::raw(
            "INSERT INTO id_generator (resource, max_id) VALUES (:resource, :step) ON CONFLICT (resource) DO \
             UPDATE SET max_id = id_generator.max_id + excluded.max_id RETURNING max_id",
        )
        .bind("resource", kind)
        .bind("step", step);

        let rows = conn.query(kit, &reserve).map_err(|err| match err {
            Error::Canceled => Error::Canceled,
            other => exhausted(kind, &other.to_string()),
        })?;
        let row = rows.first().ok_or_else(|| exhausted(kind, "counter was not advanced"))?;
        let max = i64::fetch(row, "max_id").map_err(|err| exhausted(kind, &err.to_string()))?;

        let ids = format_range(kind, max, step)?;
        tracing::debug!(rid = %kit.rid, kind, count = n, max_id = max, "reserved identifiers");
        Ok(ids)
    }
}

/// In-process allocator for tests and single-process tools.
#[derive(Debug, Default)]
pub struct MemoryIdAllocator {
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryIdAllocator {
    /// An allocator with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdAllocator for MemoryIdAllocator {
    fn allocate(&self, _conn: &dyn Connection, kit: &Kit, kind: &str, n: usize) -> Result<Vec<String>> {
        kit.check()?;
        check_batch(n)?;
        let step = i64::try_from(n).map_err(|err| invalid_parameter!("batch size {n} is too large: {err}"))?;

        let max = {
            let mut counters = self.counters.lock();
            let counter = counters.entry(kind.to_string()).or_insert(0);
            *counter += step;
            *counter
        };
        format_range(kind, max, step)
    }
}

fn check_batch(n: usize) -> Result<()> {
    if n == 0 || n > MAX_BATCH {
        return Err(invalid_parameter!("batch size must be between 1 and {MAX_BATCH}, got {n}").into());
    }
    Ok(())
}

fn exhausted(kind: &str, description: &str) -> Error {
    Error::AllocationExhausted {
        kind: kind.to_string(),
        description: description.to_string(),
    }
}

/// Formats `max - step + 1 ..= max` as 8-digit lowercase hex.
fn format_range(kind: &str, max: i64, step: i64) -> Result<Vec<String>> {
    if max > i64::from(u32::MAX) {
        return Err(exhausted(kind, &format!("counter {max} exceeds the 8-digit id space")));
    }
    let first = max - step + 1;
    if first < 1 {
        return Err(exhausted(kind, &format!("counter {max} is behind the requested batch")));
    }
    Ok((first..=max).map(|id| format!("{id:08x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, ConnectOptions, Database};

    fn database() -> Database {
        let db = Database::connect_with(ConnectOptions::in_memory()).expect("connect");
        SqlIdAllocator::migrate(&db, &Kit::new("test")).expect("migrate");
        db
    }

    #[test]
    fn batch_bounds() {
        let db = database();
        let kit = Kit::new("test");
        for n in [0, MAX_BATCH + 1] {
            let err = SqlIdAllocator.allocate(&db, &kit, "vpc", n).unwrap_err();
            assert_eq!(err.code(), "invalid_parameter");
        }
        assert_eq!(SqlIdAllocator.allocate(&db, &kit, "vpc", MAX_BATCH).unwrap().len(), MAX_BATCH);
    }

    #[test]
    fn consecutive_ranges_per_kind() {
        let db = database();
        let kit = Kit::new("test");

        assert_eq!(SqlIdAllocator.allocate(&db, &kit, "vpc", 3).unwrap(), vec!["00000001", "00000002", "00000003"]);
        assert_eq!(SqlIdAllocator.allocate(&db, &kit, "vpc", 2).unwrap(), vec!["00000004", "00000005"]);
        assert_eq!(SqlIdAllocator.allocate(&db, &kit, "subnet", 1).unwrap(), vec!["00000001"]);
    }

    #[test]
    fn ids_are_lowercase_hex() {
        assert_eq!(format_range("vpc", 0x1a, 2).unwrap(), vec!["00000019", "0000001a"]);
        let err = format_range("vpc", i64::from(u32::MAX) + 1, 1).unwrap_err();
        assert!(matches!(err, Error::AllocationExhausted { .. }));
    }

    #[test]
    fn missing_table_is_exhaustion() {
        let db = Database::connect_with(ConnectOptions::in_memory()).unwrap();
        let err = SqlIdAllocator.allocate(&db, &Kit::new("test"), "vpc", 1).unwrap_err();
        assert!(matches!(err, Error::AllocationExhausted { ref kind, .. } if kind == "vpc"));
    }

    #[test]
    fn memory_allocator_counts_per_kind() {
        let db = database();
        let kit = Kit::new("test");
        let ids = MemoryIdAllocator::new();
        assert_eq!(ids.allocate(&db, &kit, "vpc", 2).unwrap(), vec!["00000001", "00000002"]);
        assert_eq!(ids.allocate(&db, &kit, "vpc", 1).unwrap(), vec!["00000003"]);
        assert_eq!(ids.allocate(&db, &kit, "eip", 1).unwrap(), vec!["00000001"]);
    }
}
