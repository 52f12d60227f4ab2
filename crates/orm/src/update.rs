use std::collections::BTreeSet;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, Utc};
use sea_query::Value;

use crate::entity::Table;
use crate::error::Result;
use crate::predicate::WhereClause;
use crate::query::{Param, Params, Query};
use crate::record::{Leaf, LeafKind, Record, flatten};
use crate::{invalid_parameter, schema_violation};

/// Audit column refreshed by every update.
const UPDATED_AT: &str = "updated_at";

/// Decides which flattened columns an update writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPolicy {
    /// Columns written even when they hold the zero value.
    pub blanked: BTreeSet<String>,
    /// Columns never written.
    pub ignored: BTreeSet<String>,
    /// Fail when no column besides the audit column would be written.
    pub require_change: bool,
}

impl FieldPolicy {
    /// A policy without blanked or ignored columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `columns` even when they hold the zero value.
    #[must_use]
    pub fn add_blanked_fields<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.blanked.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Never writes `columns`.
    #[must_use]
    pub fn add_ignored_fields<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.ignored.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Fails updates that would change nothing.
    #[must_use]
    pub const fn require_change(mut self) -> Self {
        self.require_change = true;
        self
    }

    fn includes(&self, column: &str, leaf: &Leaf) -> bool {
        if column == UPDATED_AT || self.ignored.contains(column) {
            return false;
        }
        if self.blanked.contains(column) {
            return leaf.kind == LeafKind::Codec || !leaf.is_null();
        }
        match leaf.kind {
            LeafKind::Scalar => !is_zero(&leaf.value),
            LeafKind::Optional | LeafKind::Codec => !leaf.is_null(),
        }
    }
}

/// A compiled `SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct SetClause {
    /// `SET a = :a, ..., updated_at = now()`.
    pub sql: String,
    /// Values by column.
    pub params: Params,
    /// Columns written from the record, in order.
    pub columns: Vec<&'static str>,
}

/// Compiles the `SET` clause of a partial update.
///
/// Columns are written in name order and `updated_at = now()` is always last.
///
/// # Errors
///
/// Returns [`Error::MissingAnnotation`](crate::Error::MissingAnnotation) if the record
/// cannot be flattened, and
/// [`Error::InvalidParameter`](crate::Error::InvalidParameter) when the policy requires
/// a change and there is none.
pub fn compile_update(record: &dyn Record, policy: &FieldPolicy) -> Result<SetClause> {
    let flattened = flatten(record)?;

    let mut assignments = Vec::new();
    let mut params = Params::new();
    let mut columns = Vec::new();
    for (column, leaf) in flattened {
        if !policy.includes(column, &leaf) {
            continue;
        }
        assignments.push(format!("{column} = :{column}"));
        params.insert(column.to_string(), Param::Value(leaf.value));
        columns.push(column);
    }

    if policy.require_change && columns.is_empty() {
        return Err(invalid_parameter!("update of `{}` changes no field", record.name()));
    }

    assignments.push(format!("{UPDATED_AT} = now()"));
    Ok(SetClause {
        sql: format!("SET {}", assignments.join(", ")),
        params,
        columns,
    })
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Bool(Some(b)) => !b,
        Value::TinyInt(Some(v)) => *v == 0,
        Value::SmallInt(Some(v)) => *v == 0,
        Value::Int(Some(v)) => *v == 0,
        Value::BigInt(Some(v)) => *v == 0,
        Value::TinyUnsigned(Some(v)) => *v == 0,
        Value::SmallUnsigned(Some(v)) => *v == 0,
        Value::Unsigned(Some(v)) => *v == 0,
        Value::BigUnsigned(Some(v)) => *v == 0,
        Value::Float(Some(v)) => *v == 0.0,
        Value::Double(Some(v)) => *v == 0.0,
        Value::String(Some(s)) => s.is_empty(),
        Value::Char(Some(c)) => *c == '\0',
        Value::Bytes(Some(b)) => b.is_empty(),
        Value::Json(Some(json)) => json.is_null(),
        Value::ChronoDateTimeUtc(Some(ts)) => **ts == DateTime::<Utc>::default(),
        Value::ChronoDate(Some(date)) => **date == NaiveDate::default(),
        other => crate::validate::is_null(other),
    }
}

/// Builder for constructing UPDATE queries.
pub struct UpdateBuilder<M: Table> {
    set: SetClause,
    filter: Option<WhereClause>,
    _marker: PhantomData<M>,
}

impl<M: Table> UpdateBuilder<M> {
    /// Creates a new UPDATE query builder.
    #[must_use]
    pub const fn new(set: SetClause) -> Self {
        Self {
            set,
            filter: None,
            _marker: PhantomData,
        }
    }

    /// Sets the WHERE clause.
    #[must_use]
    pub fn r#where(mut self, filter: WhereClause) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Build the UPDATE query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) if the filter
    /// is missing or matches every row, and
    /// [`Error::SchemaViolation`](crate::Error::SchemaViolation) if a SET column is not
    /// a column of the table.
    pub fn build(self) -> Result<Query> {
        let columns = M::columns();
        if let Some(column) = self.set.columns.iter().find(|column| !columns.contains(column)) {
            return Err(schema_violation!("update of {} sets unknown column `{column}`", M::NAME));
        }

        let filter = self
            .filter
            .filter(|filter| !filter.is_match_all())
            .ok_or_else(|| invalid_parameter!("update of {} needs a filter", M::NAME))?;

        let taken: BTreeSet<String> = self.set.params.keys().cloned().collect();
        let filter = filter.avoid_names(&taken);

        let sql = format!("UPDATE {} {} {}", M::NAME, self.set.sql, filter.sql);
        let mut params = self.set.params;
        params.extend(filter.params);

        tracing::debug!(
            table = M::NAME,
            sql = %sql,
            param_count = params.len(),
            "UpdateBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
