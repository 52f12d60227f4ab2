use std::marker::PhantomData;

use crate::column::is_clock_column;
use crate::entity::Table;
use crate::error::Result;
use crate::query::{Param, Params, Query};
use crate::record::flatten;
use crate::schema_violation;

/// Builder for constructing INSERT queries, one statement per record.
pub struct InsertBuilder<'a, M: Table> {
    records: &'a [M],
    _marker: PhantomData<M>,
}

impl<'a, M: Table> InsertBuilder<'a, M> {
    /// Inserts every record of `records`.
    #[must_use]
    pub const fn from_records(records: &'a [M]) -> Self {
        Self {
            records,
            _marker: PhantomData,
        }
    }

    /// Build one INSERT query per record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaViolation`](crate::Error::SchemaViolation) if a record
    /// lacks an insert column, and any error of [`flatten`].
    pub fn build(self) -> Result<Vec<Query>> {
        let columns = M::columns();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            M::NAME,
            columns.column_expr(),
            columns.colon_name_expr()
        );

        self.records
            .iter()
            .map(|record| {
                let mut flattened = flatten(record)?;
                let mut params = Params::new();
                for column in columns.insert_columns().iter().filter(|c| !is_clock_column(columns, c)) {
                    let leaf = flattened
                        .remove(column)
                        .ok_or_else(|| schema_violation!("{} has no value for column `{column}`", M::NAME))?;
                    params.insert((*column).to_string(), Param::Value(leaf.value));
                }

                tracing::debug!(
                    table = M::NAME,
                    sql = %sql,
                    param_count = params.len(),
                    "InsertBuilder generated SQL"
                );

                Ok(Query {
                    sql: sql.clone(),
                    params,
                })
            })
            .collect()
    }
}
