//! Generic table access composed from the compilation primitives.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use stratus_orm::{
    CompileOption, DeleteBuilder, ExprOption, Expression, FetchValue, FieldPolicy, InsertBuilder, ListOption, PageOption, Record,
    Row, SelectBuilder, Table, UpdateBuilder, compile_update, invalid_parameter, validate,
};

use crate::database::{Connection, Database};
use crate::error::Result;
use crate::id::IdAllocator;
use crate::kit::Kit;

/// Result of a list request. A count request fills `count` and leaves `details`
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListResult<T> {
    /// Number of matching rows, for count requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Fetched records.
    pub details: Vec<T>,
}

/// Data access for one resource table.
pub struct Dao<M: Table> {
    db: Database,
    ids: Arc<dyn IdAllocator>,
    page_opt: PageOption,
    expr_opt: ExprOption,
    compile_opt: CompileOption,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Table> Dao<M> {
    /// A DAO over `db`, drawing primary keys from `ids`. Filters may reference
    /// the table's [`Table::rule_fields`].
    #[must_use]
    pub fn new(db: Database, ids: Arc<dyn IdAllocator>) -> Self {
        Self {
            db,
            ids,
            page_opt: PageOption::default(),
            expr_opt: ExprOption::new(M::rule_fields()),
            compile_opt: CompileOption::default(),
            _marker: PhantomData,
        }
    }

    /// Overrides the page limits.
    #[must_use]
    pub fn with_page_option(mut self, page_opt: PageOption) -> Self {
        self.page_opt = page_opt;
        self
    }

    /// Overrides the filter limits and field whitelist.
    #[must_use]
    pub fn with_expr_option(mut self, expr_opt: ExprOption) -> Self {
        self.expr_opt = expr_opt;
        self
    }

    /// Compiles every filter with `compile_opt`, e.g. crowning caller filters with
    /// a tenant scope.
    #[must_use]
    pub fn with_compile_option(mut self, compile_opt: CompileOption) -> Self {
        self.compile_opt = compile_opt;
        self
    }

    /// The underlying database.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Lists records matching `opt`.
    ///
    /// # Errors
    ///
    /// Returns validation and compilation errors unchanged, and storage errors
    /// of the query.
    pub fn list(&self, kit: &Kit, opt: &ListOption) -> Result<ListResult<M>> {
        let clause = validate(opt, &self.expr_opt, &self.page_opt)?.compile_with(&self.compile_opt)?;
        let query = SelectBuilder::<M>::new()
            .fields(opt.fields.iter().cloned())
            .r#where(clause)
            .page(&opt.page, &self.page_opt)
            .build()?;
        let rows = self.db.query(kit, &query)?;

        if opt.page.count {
            let count = match rows.first().and_then(|row| row.columns().next().map(|column| (row, column))) {
                Some((row, column)) => u64::fetch(row, column)?,
                None => 0,
            };
            return Ok(ListResult {
                count: Some(count),
                details: Vec::new(),
            });
        }

        let columns = M::columns();
        let details = rows
            .into_iter()
            .map(|row| {
                let row: Row = row
                    .into_iter()
                    .map(|(named, value)| (columns.column_for_named(&named).map_or(named, ToString::to_string), value))
                    .collect();
                M::from_row(&row)
            })
            .collect::<stratus_orm::Result<Vec<_>>>()?;

        Ok(ListResult { count: None, details })
    }

    /// Allocates primary keys for `records`, stores them on the records and
    /// inserts every record on `txn`. Returns the allocated keys, or nothing when
    /// the table does not insert its primary key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an empty batch, allocator errors, and
    /// storage errors of the inserts.
    pub fn batch_create_with_tx(&self, txn: &dyn Connection, kit: &Kit, records: &mut [M]) -> Result<Vec<String>> {
        if records.is_empty() {
            return Err(invalid_parameter!("at least one {} is required", M::NAME).into());
        }

        let mut ids = Vec::new();
        if M::columns().insert_columns().contains(&"id") {
            ids = self.ids.allocate(txn, kit, M::NAME, records.len())?;
            for (record, id) in records.iter_mut().zip(&ids) {
                record.set_id(id.clone());
            }
        }

        for query in InsertBuilder::from_records(records).build()? {
            txn.exec(kit, &query)?;
        }
        Ok(ids)
    }

    /// [`Dao::batch_create_with_tx`] in its own transaction.
    ///
    /// # Errors
    ///
    /// See [`Dao::batch_create_with_tx`]. Nothing is stored on error.
    pub fn batch_create(&self, kit: &Kit, records: &mut [M]) -> Result<Vec<String>> {
        self.db.run_in_transaction(kit, |txn| self.batch_create_with_tx(txn, kit, records))
    }

    /// Applies `patch` to the rows matching `filter` in its own transaction.
    ///
    /// # Errors
    ///
    /// See [`Dao::update_with_tx`].
    pub fn update(&self, kit: &Kit, filter: &Expression, patch: &dyn Record, policy: &FieldPolicy) -> Result<usize> {
        self.db.run_in_transaction(kit, |txn| self.update_with_tx(txn, kit, filter, patch, policy))
    }

    /// Applies `patch` to the rows matching `filter` on `txn`. Returns the number
    /// of updated rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when the filter selects every row or the policy
    /// requires a change that the patch does not carry, `SchemaViolation` when
    /// the patch sets a column the table lacks, validation and compilation
    /// errors, and storage errors of the update.
    pub fn update_with_tx(
        &self, txn: &dyn Connection, kit: &Kit, filter: &Expression, patch: &dyn Record, policy: &FieldPolicy,
    ) -> Result<usize> {
        let clause = filter.validate(&self.expr_opt)?.compile_with(&self.compile_opt)?;
        let set = compile_update(patch, policy)?;
        let query = UpdateBuilder::<M>::new(set).r#where(clause).build()?;
        txn.exec(kit, &query)
    }

    /// Deletes the rows matching `filter` on `txn`. Returns the number of deleted
    /// rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when the filter selects every row, validation
    /// and compilation errors, and storage errors of the delete.
    pub fn batch_delete_with_tx(&self, txn: &dyn Connection, kit: &Kit, filter: &Expression) -> Result<usize> {
        let clause = filter.validate(&self.expr_opt)?.compile_with(&self.compile_opt)?;
        let query = DeleteBuilder::<M>::new().r#where(clause).build()?;
        txn.exec(kit, &query)
    }
}
