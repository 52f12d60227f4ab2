use std::collections::BTreeMap;

use chrono::DateTime;
use sea_query::Value;
use serde::Deserialize;

use crate::column::{ColumnType, Columns};
use crate::error::Result;
use crate::filter::{AtomRule, Expression, FilterValue, Operator};
use crate::page::{Page, PageOption};
use crate::{invalid_parameter, schema_violation, type_mismatch};

/// Largest `in` list accepted unless configured otherwise.
pub const DEFAULT_MAX_IN_LIMIT: usize = 500;
/// Largest `nin` list accepted unless configured otherwise.
pub const DEFAULT_MAX_NOT_IN_LIMIT: usize = 500;
/// Most rules accepted in one conjunction unless configured otherwise.
pub const DEFAULT_MAX_RULES_LIMIT: usize = 10;

/// The schema and limits a filter is validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprOption {
    /// Filterable fields and their types. JSON paths are registered in full,
    /// e.g. `extension.vpc_id`.
    pub rule_fields: BTreeMap<String, ColumnType>,
    /// Maximum `in` list length.
    pub max_in_limit: usize,
    /// Maximum `nin` list length.
    pub max_not_in_limit: usize,
    /// Maximum number of rules in one conjunction.
    pub max_rules_limit: usize,
}

impl ExprOption {
    /// Default limits over `rule_fields`.
    #[must_use]
    pub const fn new(rule_fields: BTreeMap<String, ColumnType>) -> Self {
        Self {
            rule_fields,
            max_in_limit: DEFAULT_MAX_IN_LIMIT,
            max_not_in_limit: DEFAULT_MAX_NOT_IN_LIMIT,
            max_rules_limit: DEFAULT_MAX_RULES_LIMIT,
        }
    }

    /// Registers an additional filterable field.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, ty: ColumnType) -> Self {
        self.rule_fields.insert(field.into(), ty);
        self
    }

    /// Sets the maximum `in` list length.
    #[must_use]
    pub const fn max_in_limit(mut self, limit: usize) -> Self {
        self.max_in_limit = limit;
        self
    }

    /// Sets the maximum `nin` list length.
    #[must_use]
    pub const fn max_not_in_limit(mut self, limit: usize) -> Self {
        self.max_not_in_limit = limit;
        self
    }

    /// Sets the maximum number of rules per conjunction.
    #[must_use]
    pub const fn max_rules_limit(mut self, limit: usize) -> Self {
        self.max_rules_limit = limit;
        self
    }
}

impl From<&Columns> for ExprOption {
    fn from(columns: &Columns) -> Self {
        Self::new(columns.column_types())
    }
}

/// A filter that passed validation, ready for compilation.
#[derive(Debug, Clone, Copy)]
pub struct Validated<'a> {
    expr: &'a Expression,
    opt: &'a ExprOption,
}

impl<'a> Validated<'a> {
    /// The validated expression.
    #[must_use]
    pub const fn expression(&self) -> &'a Expression {
        self.expr
    }

    pub(crate) fn column_type(&self, field: &str) -> Option<ColumnType> {
        self.opt.rule_fields.get(field).copied()
    }

    /// Checks a further expression against the same schema and limits.
    pub(crate) fn admit(&self, expr: &Expression) -> Result<()> {
        validate_expr(expr, self.opt)
    }
}

impl Expression {
    /// Checks every rule against `opt`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaViolation`](crate::Error::SchemaViolation) for unknown
    /// fields, [`Error::TypeMismatch`](crate::Error::TypeMismatch) when an operator or
    /// value does not suit the field and
    /// [`Error::InvalidParameter`](crate::Error::InvalidParameter) for structural
    /// problems such as oversized lists.
    pub fn validate<'a>(&'a self, opt: &'a ExprOption) -> Result<Validated<'a>> {
        validate_expr(self, opt)?;
        Ok(Validated { expr: self, opt })
    }
}

/// The list request handed to a table: filter, page and field whitelist.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListOption {
    /// Filter. Required; an empty conjunction selects every row.
    pub filter: Option<Expression>,
    /// Page.
    pub page: Page,
    /// Columns to return. Empty returns all columns.
    pub fields: Vec<String>,
}

impl ListOption {
    /// A list request for `filter` over `page`.
    #[must_use]
    pub const fn new(filter: Expression, page: Page) -> Self {
        Self {
            filter: Some(filter),
            page,
            fields: Vec::new(),
        }
    }

    /// Restricts the returned columns.
    #[must_use]
    pub fn fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Validates a list request: its filter, page and field whitelist.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) when the filter is
/// missing, plus any error of [`Expression::validate`] and [`Page::validate`]. Unknown
/// whitelisted fields are a [`Error::SchemaViolation`](crate::Error::SchemaViolation).
pub fn validate<'a>(
    list: &'a ListOption, expr_opt: &'a ExprOption, page_opt: &PageOption,
) -> Result<Validated<'a>> {
    let filter = list.filter.as_ref().ok_or_else(|| invalid_parameter!("filter is required"))?;
    let validated = filter.validate(expr_opt)?;
    list.page.validate(page_opt, &expr_opt.rule_fields)?;

    if let Some(field) = list.fields.iter().find(|f| !expr_opt.rule_fields.contains_key(f.as_str()))
    {
        return Err(schema_violation!("field `{field}` is not a known column"));
    }

    Ok(validated)
}

fn validate_expr(expr: &Expression, opt: &ExprOption) -> Result<()> {
    match expr {
        Expression::Conjunction { rules, .. } => {
            if rules.len() > opt.max_rules_limit {
                return Err(invalid_parameter!(
                    "expression has {} rules, at most {} are allowed",
                    rules.len(),
                    opt.max_rules_limit
                ));
            }
            rules.iter().try_for_each(|rule| validate_expr(rule, opt))
        }
        Expression::Atom(rule) => validate_rule(rule, opt),
    }
}

fn validate_rule(rule: &AtomRule, opt: &ExprOption) -> Result<()> {
    let field = rule.field.as_str();
    if field.is_empty() {
        return Err(invalid_parameter!("rule field is empty"));
    }
    let ty = *opt
        .rule_fields
        .get(field)
        .ok_or_else(|| schema_violation!("rule field `{field}` is not a known column"))?;

    if rule.op == Operator::IdGreaterThan && field != "id" {
        return Err(invalid_parameter!("operator {} only supports the id field", rule.op));
    }
    if rule.op.checks_key() {
        if ty != ColumnType::Json {
            return Err(type_mismatch!("operator {} needs a JSON column, `{field}` is {ty}", rule.op));
        }
    } else if rule.op.is_json() {
        validate_json_path(field)?;
    } else if field.contains('.') {
        return Err(type_mismatch!("`{field}` is a JSON path and needs a json_* operator"));
    }

    match &rule.value {
        FilterValue::Scalar(_) if rule.op.takes_list() => {
            Err(type_mismatch!("operator {} on `{field}` needs a list value", rule.op))
        }
        FilterValue::List(_) if !rule.op.takes_list() => {
            Err(type_mismatch!("operator {} on `{field}` needs a single value", rule.op))
        }
        FilterValue::Scalar(value) => {
            validate_scalar(field, rule.op, value)?;
            if rule.op == Operator::JsonLength {
                // The value counts elements; it is not compared with them.
                return Ok(());
            }
            validate_column_type(field, ty, value)
        }
        FilterValue::List(values) => {
            let limit = if rule.op == Operator::NotIn { opt.max_not_in_limit } else { opt.max_in_limit };
            if values.is_empty() {
                return Err(invalid_parameter!("operator {} on `{field}` needs at least one value", rule.op));
            }
            if values.len() > limit {
                return Err(invalid_parameter!(
                    "operator {} on `{field}` has {} values, at most {limit} are allowed",
                    rule.op,
                    values.len()
                ));
            }
            values.iter().try_for_each(|value| {
                if is_null(value) {
                    return Err(invalid_parameter!("rule value of `{field}` can not be null"));
                }
                if !is_basic(value) {
                    return Err(type_mismatch!("{} values of `{field}` must be bool, numeric or string", rule.op));
                }
                validate_column_type(field, ty, value)
            })
        }
    }
}

fn validate_scalar(field: &str, op: Operator, value: &Value) -> Result<()> {
    if is_null(value) {
        return Err(invalid_parameter!("rule value of `{field}` can not be null"));
    }

    match op {
        Operator::Equal
        | Operator::NotEqual
        | Operator::JsonEqual
        | Operator::JsonNotEqual
        | Operator::JsonContains
        | Operator::IdGreaterThan => {
            if !is_basic(value) {
                return Err(type_mismatch!("{op} value of `{field}` must be bool, numeric or string"));
            }
        }
        Operator::GreaterThan
        | Operator::GreaterThanEqual
        | Operator::LessThan
        | Operator::LessThanEqual => {
            if !is_numeric(value) && !is_time(value) {
                return Err(type_mismatch!("{op} value of `{field}` must be numeric or a time"));
            }
        }
        Operator::ContainsSensitive | Operator::ContainsInsensitive => match value {
            Value::String(Some(s)) if !s.is_empty() => {}
            _ => return Err(type_mismatch!("{op} value of `{field}` must be a non-empty string")),
        },
        Operator::JsonContainsPath | Operator::JsonNotContainsPath => match value {
            Value::String(Some(key)) if is_key_path(key) => {}
            _ => return Err(type_mismatch!("{op} value of `{field}` must be a key path like `key` or `key.sub`")),
        },
        Operator::JsonLength => {
            if !is_numeric(value) {
                return Err(type_mismatch!("{op} value of `{field}` must be numeric"));
            }
        }
        Operator::In | Operator::NotIn | Operator::JsonIn | Operator::JsonOverlaps => {}
    }
    Ok(())
}

fn validate_column_type(field: &str, ty: ColumnType, value: &Value) -> Result<()> {
    let ok = match ty {
        ColumnType::String => matches!(value, Value::String(Some(_)) | Value::Char(Some(_))),
        ColumnType::Numeric => is_numeric(value),
        ColumnType::Boolean => matches!(value, Value::Bool(Some(_))),
        ColumnType::Time => is_time(value),
        ColumnType::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(type_mismatch!("value of `{field}` should be {ty}"))
    }
}

fn validate_json_path(field: &str) -> Result<()> {
    let Some((column, key)) = field.split_once('.') else {
        return Err(invalid_parameter!("`{field}` is not a JSON path like `column.key`"));
    };
    if !is_ident(column) || !is_key_path(key) {
        return Err(invalid_parameter!("`{field}` is not a JSON path like `column.key`"));
    }
    Ok(())
}

fn is_ident(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_key_path(key: &str) -> bool {
    key.split('.').all(is_ident)
}

pub(crate) const fn is_null(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Char(None)
            | Value::Bytes(None)
            | Value::Json(None)
            | Value::ChronoDate(None)
            | Value::ChronoTime(None)
            | Value::ChronoDateTime(None)
            | Value::ChronoDateTimeUtc(None)
            | Value::ChronoDateTimeLocal(None)
            | Value::ChronoDateTimeWithTimeZone(None)
    )
}

const fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::TinyInt(Some(_))
            | Value::SmallInt(Some(_))
            | Value::Int(Some(_))
            | Value::BigInt(Some(_))
            | Value::TinyUnsigned(Some(_))
            | Value::SmallUnsigned(Some(_))
            | Value::Unsigned(Some(_))
            | Value::BigUnsigned(Some(_))
            | Value::Float(Some(_))
            | Value::Double(Some(_))
    )
}

fn is_basic(value: &Value) -> bool {
    is_numeric(value)
        || matches!(
            value,
            Value::Bool(Some(_))
                | Value::String(Some(_))
                | Value::Char(Some(_))
                | Value::ChronoDateTimeUtc(Some(_))
        )
}

fn is_time(value: &Value) -> bool {
    match value {
        Value::ChronoDateTimeUtc(Some(_)) => true,
        Value::String(Some(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::Error;

    fn opt() -> ExprOption {
        ExprOption::new(
            [
                ("id", ColumnType::String),
                ("name", ColumnType::String),
                ("bk_biz_id", ColumnType::Numeric),
                ("enabled", ColumnType::Boolean),
                ("created_at", ColumnType::Time),
                ("extension", ColumnType::Json),
            ]
            .into_iter()
            .map(|(c, t)| (c.to_string(), t))
            .collect(),
        )
        .with_field("extension.vpc_id", ColumnType::String)
    }

    #[test]
    fn known_fields_pass() {
        let opt = opt();
        let expr = Expression::and(vec![
            Expression::eq("id", "a1"),
            Expression::ne("bk_biz_id", 0),
            Expression::r#in("name", ["a", "b"]),
            Expression::gte("created_at", "2024-01-15T10:30:45Z"),
            Expression::lt("created_at", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            Expression::eq("enabled", true),
            Expression::json_eq("extension.vpc_id", "vpc-1"),
            Expression::id_gt("id", "00000010"),
        ]);
        let validated = expr.validate(&opt).unwrap();
        assert_eq!(validated.expression(), &expr);
    }

    #[test]
    fn unknown_field_is_schema_violation() {
        let opt = opt();
        let expr = Expression::or(vec![Expression::eq("id", "a1"), Expression::eq("memo", "x")]);
        assert!(matches!(expr.validate(&opt).unwrap_err(), Error::SchemaViolation { .. }));
    }

    #[test]
    fn type_mismatches() {
        let opt = opt();
        let cases = [
            Expression::eq("bk_biz_id", "10"),
            Expression::eq("name", 10),
            Expression::eq("enabled", "true"),
            Expression::gt("created_at", "yesterday"),
            Expression::gt("name", "abc"),
            Expression::cs("name", ""),
            Expression::r#in("bk_biz_id", ["1"]),
            Expression::eq("extension.vpc_id", "vpc-1"),
            Expression::Atom(AtomRule {
                field: "name".to_string(),
                op: Operator::In,
                value: FilterValue::Scalar("a".into()),
            }),
        ];
        for expr in cases {
            let err = expr.validate(&opt).unwrap_err();
            assert!(matches!(err, Error::TypeMismatch { .. }), "{expr:?} gave {err}");
        }
    }

    #[test]
    fn list_limits() {
        let opt = opt().max_in_limit(3).max_not_in_limit(2);
        Expression::r#in("bk_biz_id", [1, 2, 3]).validate(&opt).unwrap();

        let err = Expression::r#in("bk_biz_id", [1, 2, 3, 4]).validate(&opt).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        let err = Expression::not_in("bk_biz_id", [1, 2, 3]).validate(&opt).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
        let err = Expression::r#in("bk_biz_id", Vec::<i64>::new()).validate(&opt).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn rule_count_limit() {
        let opt = opt().max_rules_limit(2);
        let expr = Expression::and((0..3).map(|i| Expression::eq("bk_biz_id", i)).collect());
        assert!(matches!(expr.validate(&opt).unwrap_err(), Error::InvalidParameter { .. }));
    }

    #[test]
    fn json_array_and_key_operators() {
        let opt = opt().with_field("extension.zones", ColumnType::String);
        let expr = Expression::and(vec![
            Expression::json_overlaps("extension.zones", ["ap-1", "ap-2"]),
            Expression::json_contains_path("extension", "vpc_id"),
            Expression::json_not_contains_path("extension", "spec.zone"),
            Expression::json_length("extension.zones", 2),
        ]);
        expr.validate(&opt).unwrap();

        let mismatches = [
            Expression::json_length("extension.zones", "2"),
            Expression::json_contains_path("name", "vpc_id"),
            Expression::json_contains_path("extension", "bad key"),
            Expression::json_not_contains_path("extension", 1),
            Expression::Atom(AtomRule {
                field: "extension".to_string(),
                op: Operator::JsonContainsPath,
                value: FilterValue::List(vec!["vpc_id".into()]),
            }),
            Expression::Atom(AtomRule {
                field: "extension.zones".to_string(),
                op: Operator::JsonOverlaps,
                value: FilterValue::Scalar("ap-1".into()),
            }),
        ];
        for expr in mismatches {
            let err = expr.validate(&opt).unwrap_err();
            assert!(matches!(err, Error::TypeMismatch { .. }), "{expr:?} gave {err}");
        }

        let opt = opt.max_in_limit(1);
        let err = Expression::json_overlaps("extension.zones", ["ap-1", "ap-2"]).validate(&opt).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn id_operators_only_on_id() {
        let err = Expression::id_gt("name", "a").validate(&opt()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn null_values_rejected() {
        let err = Expression::eq("name", Option::<String>::None).validate(&opt()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn list_option_requires_filter() {
        let opt = opt();
        let list = ListOption {
            page: Page::new(0, 10),
            ..ListOption::default()
        };
        let err = validate(&list, &opt, &PageOption::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn list_option_checks_page_and_fields() {
        let opt = opt();
        let list = ListOption::new(Expression::default(), Page::new(0, 10)).fields(["id", "name"]);
        validate(&list, &opt, &PageOption::default()).unwrap();

        let list = ListOption::new(Expression::default(), Page::new(0, 10)).fields(["id", "memo"]);
        let err = validate(&list, &opt, &PageOption::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));

        let list = ListOption::new(Expression::default(), Page::new(0, 1000));
        let err = validate(&list, &opt, &PageOption::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn list_option_from_json() {
        let list: ListOption = serde_json::from_str(
            r#"{"filter": {"op": "and", "rules": [{"field": "name", "op": "eq", "value": "web"}]},
                "page": {"count": true}}"#,
        )
        .unwrap();
        assert!(list.page.count);
        validate(&list, &opt(), &PageOption::default()).unwrap();
    }
}
