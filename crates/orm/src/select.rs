use std::marker::PhantomData;

use crate::entity::Table;
use crate::error::Result;
use crate::page::{Page, PageOption};
use crate::predicate::WhereClause;
use crate::query::{Params, Query};
use crate::schema_violation;

/// Builder for constructing SELECT queries.
pub struct SelectBuilder<M: Table> {
    fields: Vec<String>,
    filter: Option<WhereClause>,
    page: Option<(Page, PageOption)>,
    count: bool,
    _marker: PhantomData<M>,
}

impl<M: Table> Default for SelectBuilder<M> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            filter: None,
            page: None,
            count: false,
            _marker: PhantomData,
        }
    }
}

impl<M: Table> SelectBuilder<M> {
    /// Creates a new SELECT query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the projection to `fields`. Empty selects every column.
    #[must_use]
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn r#where(mut self, filter: WhereClause) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Applies a page. A count page turns the query into a count.
    #[must_use]
    pub fn page(mut self, page: &Page, opt: &PageOption) -> Self {
        self.count = page.count;
        self.page = Some((page.clone(), opt.clone()));
        self
    }

    /// Counts matching rows instead of fetching them.
    #[must_use]
    pub const fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Build the SELECT query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaViolation`](crate::Error::SchemaViolation) if no
    /// whitelisted field is a column, and any error of [`Page::compile`].
    pub fn build(self) -> Result<Query> {
        let projection = if self.count {
            "COUNT(*)".to_string()
        } else {
            let projection = M::columns().fields_named_expr(&self.fields);
            if projection.is_empty() {
                return Err(schema_violation!("no selected field is a column of {}", M::NAME));
            }
            projection
        };

        let mut sql = format!("SELECT {projection} FROM {}", M::NAME);
        let mut params = Params::new();
        if let Some(filter) = self.filter {
            sql.push(' ');
            sql.push_str(&filter.sql);
            params = filter.params;
        }
        if !self.count
            && let Some((page, opt)) = self.page
        {
            let suffix = page.compile(&opt)?;
            if !suffix.is_empty() {
                sql.push(' ');
                sql.push_str(&suffix);
            }
        }

        tracing::debug!(
            table = M::NAME,
            sql = %sql,
            param_count = params.len(),
            "SelectBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
