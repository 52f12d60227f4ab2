//! Transactional unit of work.

#![allow(clippy::significant_drop_tightening)]

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Transaction, TransactionBehavior};
use stratus_orm::{Query, Row};
use tracing::instrument;

use crate::database::{Connection, Database, exec_statement, query_rows};
use crate::error::Result;
use crate::kit::Kit;

/// An open transaction. Statements run through it commit or roll back together.
pub struct Txn<'a> {
    tx: Transaction<'a>,
    slow: Duration,
}

impl Connection for Txn<'_> {
    fn query(&self, kit: &Kit, query: &Query) -> Result<Vec<Row>> {
        query_rows(&self.tx, self.slow, kit, query)
    }

    fn exec(&self, kit: &Kit, query: &Query) -> Result<usize> {
        exec_statement(&self.tx, self.slow, kit, query)
    }
}

impl Database {
    /// Runs `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. Rolls back when it returns an error or
    /// panics; the error is returned unchanged and the panic resumes after the
    /// rollback. A rollback failure is logged and never replaces the original
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the error of `f`, [`Error::Canceled`](crate::Error::Canceled) if
    /// the kit is already cancelled, or [`Error::Storage`](crate::Error::Storage)
    /// if the transaction cannot begin or commit.
    #[instrument(skip_all, fields(rid = %kit.rid))]
    pub fn run_in_transaction<T>(&self, kit: &Kit, f: impl FnOnce(&Txn<'_>) -> Result<T>) -> Result<T> {
        kit.check()?;

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to begin transaction")?;
        let txn = Txn { tx, slow: self.slow };

        match panic::catch_unwind(AssertUnwindSafe(|| f(&txn))) {
            Ok(Ok(value)) => {
                txn.tx.commit().context("failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(rollback) = txn.tx.rollback() {
                    tracing::error!(rid = %kit.rid, error = %rollback, "failed to roll back transaction");
                }
                Err(err)
            }
            Err(payload) => {
                if let Err(rollback) = txn.tx.rollback() {
                    tracing::error!(rid = %kit.rid, error = %rollback, "failed to roll back transaction");
                }
                tracing::error!(rid = %kit.rid, "transaction callback panicked, rolled back");
                panic::resume_unwind(payload)
            }
        }
    }
}
