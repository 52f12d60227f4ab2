use std::marker::PhantomData;

use crate::entity::Table;
use crate::error::Result;
use crate::invalid_parameter;
use crate::predicate::WhereClause;
use crate::query::Query;

/// Builder for constructing DELETE queries.
pub struct DeleteBuilder<M: Table> {
    filter: Option<WhereClause>,
    _marker: PhantomData<M>,
}

impl<M: Table> Default for DeleteBuilder<M> {
    fn default() -> Self {
        Self {
            filter: None,
            _marker: PhantomData,
        }
    }
}

impl<M: Table> DeleteBuilder<M> {
    /// Creates a new DELETE query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn r#where(mut self, filter: WhereClause) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build the DELETE query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) if the filter
    /// is missing or matches every row.
    pub fn build(self) -> Result<Query> {
        let filter = self
            .filter
            .filter(|filter| !filter.is_match_all())
            .ok_or_else(|| invalid_parameter!("delete from {} needs a filter", M::NAME))?;

        let sql = format!("DELETE FROM {} {}", M::NAME, filter.sql);

        tracing::debug!(
            table = M::NAME,
            sql = %sql,
            param_count = filter.params.len(),
            "DeleteBuilder generated SQL"
        );

        Ok(Query {
            sql,
            params: filter.params,
        })
    }
}
