use std::fmt;

use sea_query::Value;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::invalid_parameter;

/// Logical operator joining the rules of a conjunction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOp {
    /// All rules must match.
    And,
    /// Any rule may match.
    Or,
}

impl LogicOp {
    pub(crate) const fn keyword(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Filter operator. Each operator renders its own SQL fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// `field = value`
    #[serde(rename = "eq")]
    Equal,
    /// `field != value`
    #[serde(rename = "neq")]
    NotEqual,
    /// `field > value`
    #[serde(rename = "gt")]
    GreaterThan,
    /// `field >= value`
    #[serde(rename = "gte")]
    GreaterThanEqual,
    /// `field < value`
    #[serde(rename = "lt")]
    LessThan,
    /// `field <= value`
    #[serde(rename = "lte")]
    LessThanEqual,
    /// `field IN (values)`
    #[serde(rename = "in")]
    In,
    /// `field NOT IN (values)`
    #[serde(rename = "nin")]
    NotIn,
    /// Case-sensitive substring match.
    #[serde(rename = "cs")]
    ContainsSensitive,
    /// Case-insensitive substring match.
    #[serde(rename = "cis")]
    ContainsInsensitive,
    /// `id > value`, allowed on the `id` field only.
    #[serde(rename = "id_gt")]
    IdGreaterThan,
    /// JSON path equals value.
    #[serde(rename = "json_eq")]
    JsonEqual,
    /// JSON path differs from value.
    #[serde(rename = "json_neq")]
    JsonNotEqual,
    /// JSON path is one of values.
    #[serde(rename = "json_in")]
    JsonIn,
    /// JSON array at path contains value.
    #[serde(rename = "json_contains")]
    JsonContains,
    /// JSON array at path shares at least one element with values.
    #[serde(rename = "json_overlaps")]
    JsonOverlaps,
    /// JSON column has the key path given as the value.
    #[serde(rename = "json_contains_path")]
    JsonContainsPath,
    /// JSON column lacks the key path given as the value.
    #[serde(rename = "json_not_contains_path")]
    JsonNotContainsPath,
    /// JSON array at path has exactly value elements.
    #[serde(rename = "json_length")]
    JsonLength,
}

impl Operator {
    /// The operator's wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Equal => "eq",
            Self::NotEqual => "neq",
            Self::GreaterThan => "gt",
            Self::GreaterThanEqual => "gte",
            Self::LessThan => "lt",
            Self::LessThanEqual => "lte",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::ContainsSensitive => "cs",
            Self::ContainsInsensitive => "cis",
            Self::IdGreaterThan => "id_gt",
            Self::JsonEqual => "json_eq",
            Self::JsonNotEqual => "json_neq",
            Self::JsonIn => "json_in",
            Self::JsonContains => "json_contains",
            Self::JsonOverlaps => "json_overlaps",
            Self::JsonContainsPath => "json_contains_path",
            Self::JsonNotContainsPath => "json_not_contains_path",
            Self::JsonLength => "json_length",
        }
    }

    /// Whether the operator addresses a path inside a JSON column.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(
            self,
            Self::JsonEqual
                | Self::JsonNotEqual
                | Self::JsonIn
                | Self::JsonContains
                | Self::JsonOverlaps
                | Self::JsonContainsPath
                | Self::JsonNotContainsPath
                | Self::JsonLength
        )
    }

    /// Whether the rule's field names a whole JSON column and its value is the
    /// key path looked up inside it.
    #[must_use]
    pub const fn checks_key(self) -> bool {
        matches!(self, Self::JsonContainsPath | Self::JsonNotContainsPath)
    }

    /// Whether the operator takes a list of values.
    #[must_use]
    pub const fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::JsonIn | Self::JsonOverlaps)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The right-hand side of an atomic rule.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// A single value.
    Scalar(Value),
    /// A value list, for set-membership operators.
    List(Vec<Value>),
}

/// A single `field op value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomRule {
    /// Column name, or `column.key` for JSON operators.
    pub field: String,
    /// Operator.
    pub op: Operator,
    /// Operand.
    pub value: FilterValue,
}

/// A filter expression tree.
///
/// Trees are built from caller input and carry no trust: they must pass
/// [`Expression::validate`] before they can be compiled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub enum Expression {
    /// AND/OR combination of child rules.
    Conjunction {
        /// Joining operator.
        op: LogicOp,
        /// Child rules.
        rules: Vec<Self>,
    },
    /// A single condition.
    Atom(AtomRule),
}

impl Default for Expression {
    fn default() -> Self {
        Self::and(Vec::new())
    }
}

macro_rules! scalar_rules {
    ($($(#[$meta:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $name(field: impl Into<String>, value: impl Into<Value>) -> Self {
                Self::Atom(AtomRule {
                    field: field.into(),
                    op: Operator::$op,
                    value: FilterValue::Scalar(value.into()),
                })
            }
        )*
    };
}

macro_rules! list_rules {
    ($($(#[$meta:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[must_use]
            pub fn $name(
                field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>,
            ) -> Self {
                Self::Atom(AtomRule {
                    field: field.into(),
                    op: Operator::$op,
                    value: FilterValue::List(values.into_iter().map(Into::into).collect()),
                })
            }
        )*
    };
}

impl Expression {
    /// AND of `rules`. An empty list matches every row.
    #[must_use]
    pub const fn and(rules: Vec<Self>) -> Self {
        Self::Conjunction {
            op: LogicOp::And,
            rules,
        }
    }

    /// OR of `rules`.
    #[must_use]
    pub const fn or(rules: Vec<Self>) -> Self {
        Self::Conjunction {
            op: LogicOp::Or,
            rules,
        }
    }

    scalar_rules! {
        /// `field = value`
        eq => Equal,
        /// `field != value`
        ne => NotEqual,
        /// `field > value`
        gt => GreaterThan,
        /// `field >= value`
        gte => GreaterThanEqual,
        /// `field < value`
        lt => LessThan,
        /// `field <= value`
        lte => LessThanEqual,
        /// Case-sensitive substring match.
        cs => ContainsSensitive,
        /// Case-insensitive substring match.
        cis => ContainsInsensitive,
        /// `id > value`
        id_gt => IdGreaterThan,
        /// JSON path `field` equals value.
        json_eq => JsonEqual,
        /// JSON path `field` differs from value.
        json_ne => JsonNotEqual,
        /// JSON array at `field` contains value.
        json_contains => JsonContains,
        /// JSON column `field` has the key path `value`, e.g. `vpc_id` or `spec.zone`.
        json_contains_path => JsonContainsPath,
        /// JSON column `field` lacks the key path `value`.
        json_not_contains_path => JsonNotContainsPath,
        /// JSON array at `field` has `value` elements.
        json_length => JsonLength,
    }

    list_rules! {
        /// `field IN (values)`
        r#in => In,
        /// `field NOT IN (values)`
        not_in => NotIn,
        /// JSON path `field` is one of values.
        json_in => JsonIn,
        /// JSON array at `field` shares an element with values.
        json_overlaps => JsonOverlaps,
    }

    /// Whether this is a conjunction without rules, which matches every row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Conjunction { rules, .. } if rules.is_empty())
    }

    /// Whether the expression matches every row whatever the data.
    ///
    /// A conjunction without rules matches everything. Otherwise an AND does when
    /// all of its rules do and an OR does when any of its rules does.
    #[must_use]
    pub fn matches_all(&self) -> bool {
        match self {
            Self::Conjunction { rules, .. } if rules.is_empty() => true,
            Self::Conjunction { op: LogicOp::And, rules } => rules.iter().all(Self::matches_all),
            Self::Conjunction { op: LogicOp::Or, rules } => rules.iter().any(Self::matches_all),
            Self::Atom(_) => false,
        }
    }
}

impl TryFrom<serde_json::Value> for Expression {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(mut obj) = json else {
            return Err(invalid_parameter!("filter expression must be a JSON object"));
        };

        if obj.contains_key("field") {
            let field = match obj.remove("field") {
                Some(serde_json::Value::String(field)) => field,
                _ => return Err(invalid_parameter!("rule field must be a string")),
            };
            let op = obj
                .remove("op")
                .ok_or_else(|| invalid_parameter!("rule on `{field}` has no op"))?;
            let op: Operator = serde_json::from_value(op)?;
            let value = obj
                .remove("value")
                .ok_or_else(|| invalid_parameter!("rule on `{field}` has no value"))?;
            let value = filter_value(&field, value)?;
            return Ok(Self::Atom(AtomRule { field, op, value }));
        }

        let op = match obj.remove("op") {
            Some(op) => serde_json::from_value(op)?,
            None if obj.is_empty() => LogicOp::And,
            None => return Err(invalid_parameter!("expression has no op")),
        };
        let rules = match obj.remove("rules") {
            Some(serde_json::Value::Array(rules)) => {
                rules.into_iter().map(Self::try_from).collect::<Result<Vec<_>>>()?
            }
            Some(serde_json::Value::Null) | None => Vec::new(),
            Some(_) => return Err(invalid_parameter!("expression rules must be an array")),
        };
        Ok(Self::Conjunction { op, rules })
    }
}

fn filter_value(field: &str, value: serde_json::Value) -> Result<FilterValue> {
    match value {
        serde_json::Value::Array(items) => {
            let values = items
                .into_iter()
                .map(|item| json_scalar(field, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(FilterValue::List(values))
        }
        other => Ok(FilterValue::Scalar(json_scalar(field, other)?)),
    }
}

fn json_scalar(field: &str, value: serde_json::Value) -> Result<Value> {
    match value {
        serde_json::Value::Null => Err(invalid_parameter!("rule value of `{field}` can not be null")),
        serde_json::Value::Bool(b) => Ok(Value::Bool(Some(b))),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::BigInt(Some(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::BigUnsigned(Some(u)))
            } else {
                Ok(Value::Double(n.as_f64()))
            }
        }
        serde_json::Value::String(s) => Ok(Value::String(Some(Box::new(s)))),
        other => Ok(Value::Json(Some(Box::new(other)))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_nested_expression() {
        let expr: Expression = serde_json::from_value(json!({
            "op": "and",
            "rules": [
                {"field": "id", "op": "eq", "value": "a1"},
                {"op": "or", "rules": [
                    {"field": "bk_biz_id", "op": "in", "value": [1, 2]},
                    {"field": "name", "op": "cis", "value": "Web"}
                ]}
            ]
        }))
        .unwrap();

        let expected = Expression::and(vec![
            Expression::eq("id", "a1"),
            Expression::or(vec![
                Expression::r#in("bk_biz_id", [1_i64, 2]),
                Expression::cis("name", "Web"),
            ]),
        ]);
        assert_eq!(expr, expected);
    }

    #[test]
    fn parse_empty_object_is_match_all() {
        let expr: Expression = serde_json::from_str("{}").unwrap();
        assert!(expr.is_empty());
    }

    #[test]
    fn parse_rejects_null_values() {
        let err = serde_json::from_value::<Expression>(json!({
            "op": "and",
            "rules": [{"field": "name", "op": "eq", "value": null}]
        }))
        .unwrap_err();
        assert!(err.to_string().contains("can not be null"));
    }

    #[test]
    fn parse_rejects_unknown_operator() {
        let result = serde_json::from_value::<Expression>(json!({
            "op": "and",
            "rules": [{"field": "name", "op": "regex", "value": "x"}]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn operator_names_round_trip() {
        for op in [
            Operator::Equal,
            Operator::NotIn,
            Operator::IdGreaterThan,
            Operator::JsonContains,
            Operator::JsonOverlaps,
            Operator::JsonNotContainsPath,
            Operator::JsonLength,
        ] {
            let name = serde_json::to_value(op).unwrap();
            assert_eq!(name, json!(op.name()));
        }
    }

    #[test]
    fn nested_match_all() {
        assert!(Expression::default().matches_all());
        assert!(Expression::and(vec![Expression::and(vec![])]).matches_all());
        assert!(Expression::or(vec![Expression::and(vec![]), Expression::eq("name", "a")]).matches_all());
        assert!(!Expression::and(vec![Expression::and(vec![]), Expression::eq("name", "a")]).matches_all());
        assert!(Expression::or(vec![]).matches_all());
        assert!(!Expression::or(vec![Expression::eq("name", "a"), Expression::eq("name", "b")]).matches_all());
    }

    #[test]
    fn parse_key_path_rules() {
        let expr: Expression = serde_json::from_value(json!({
            "op": "or",
            "rules": [
                {"field": "extension", "op": "json_contains_path", "value": "vpc_id"},
                {"field": "extension.zones", "op": "json_overlaps", "value": ["ap-1", "ap-2"]}
            ]
        }))
        .unwrap();

        let expected = Expression::or(vec![
            Expression::json_contains_path("extension", "vpc_id"),
            Expression::json_overlaps("extension.zones", ["ap-1", "ap-2"]),
        ]);
        assert_eq!(expr, expected);
    }
}
