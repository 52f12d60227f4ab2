use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sea_query::Value;

use crate::column::ColumnType;
use crate::error::Result;
use crate::filter::{AtomRule, Expression, FilterValue, LogicOp, Operator};
use crate::invalid_parameter;
use crate::query::{Param, Params, rewrite_placeholders};
use crate::validate::Validated;

/// Predicate used for an empty conjunction.
const ALWAYS_TRUE: &str = "1 = 1";

/// A compiled `WHERE` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// `WHERE ...` text with `:name` placeholders.
    pub sql: String,
    /// Bound values by placeholder name.
    pub params: Params,
    match_all: bool,
}

impl WhereClause {
    /// Whether the clause matches every row, decided on the compiled expression
    /// tree rather than the SQL text.
    #[must_use]
    pub const fn is_match_all(&self) -> bool {
        self.match_all
    }

    /// Renames placeholders that collide with `taken`, so the clause can share a
    /// statement with other parameters.
    #[must_use]
    pub fn avoid_names(self, taken: &BTreeSet<String>) -> Self {
        let mut used: BTreeSet<String> = taken.iter().chain(self.params.keys()).cloned().collect();
        let mut renames: BTreeMap<String, String> = BTreeMap::new();
        for name in self.params.keys().filter(|name| taken.contains(*name)) {
            let fresh = unique_name(name, &mut used);
            renames.insert(name.clone(), fresh);
        }
        if renames.is_empty() {
            return self;
        }

        let sql = rewrite_placeholders(&self.sql, |name| renames.get(name).map(|n| format!(":{n}")));
        let params = self
            .params
            .into_iter()
            .map(|(name, param)| (renames.get(&name).cloned().unwrap_or(name), param))
            .collect();
        Self {
            sql,
            params,
            match_all: self.match_all,
        }
    }
}

/// Options for [`Validated::compile_with`].
#[derive(Debug, Clone, Default)]
pub struct CompileOption {
    /// Fields whose rules move to the front of each conjunction, in this order.
    pub priority: Vec<String>,
    /// Placeholder names already used by the surrounding statement.
    pub reserved: BTreeSet<String>,
    /// Server-side rules combined with the caller's filter. The rules are ANDed
    /// together, then joined to the filter with the given operator.
    pub crowned: Option<(LogicOp, Vec<Expression>)>,
}

impl CompileOption {
    /// Sets the priority fields.
    #[must_use]
    pub fn priority<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.priority = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Reserves placeholder names.
    #[must_use]
    pub fn reserved<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.reserved = names.into_iter().map(Into::into).collect();
        self
    }

    /// Crowns the filter with `rules`, joined to it by `op`.
    #[must_use]
    pub fn crowned(mut self, op: LogicOp, rules: Vec<Expression>) -> Self {
        self.crowned = Some((op, rules));
        self
    }
}

impl Validated<'_> {
    /// Compiles the filter into a `WHERE` clause.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) if a time
    /// value cannot be parsed.
    pub fn compile(&self) -> Result<WhereClause> {
        self.compile_with(&CompileOption::default())
    }

    /// Compiles the filter with explicit options.
    ///
    /// Crowned rules are checked against the same schema as the filter. An empty
    /// filter leaves the crowned rules alone, and no crowned rules leave the filter
    /// alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) if a time
    /// value cannot be parsed, plus any error of [`Expression::validate`] for the
    /// crowned rules.
    pub fn compile_with(&self, opt: &CompileOption) -> Result<WhereClause> {
        let crowned = match &opt.crowned {
            Some((op, rules)) if !rules.is_empty() => {
                rules.iter().try_for_each(|rule| self.admit(rule))?;
                let crown = Expression::and(rules.clone());
                Some(if self.expression().is_empty() {
                    crown
                } else {
                    Expression::Conjunction {
                        op: *op,
                        rules: vec![self.expression().clone(), crown],
                    }
                })
            }
            _ => None,
        };
        let expr = crowned.as_ref().unwrap_or_else(|| self.expression());

        let mut compiler = Compiler {
            validated: self,
            priority: &opt.priority,
            used: opt.reserved.clone(),
            params: Params::new(),
        };
        let predicate = compiler.expr(expr)?;

        Ok(WhereClause {
            sql: format!("WHERE {predicate}"),
            params: compiler.params,
            match_all: expr.matches_all(),
        })
    }
}

struct Compiler<'v, 'a> {
    validated: &'v Validated<'a>,
    priority: &'v [String],
    used: BTreeSet<String>,
    params: Params,
}

impl Compiler<'_, '_> {
    fn expr(&mut self, expr: &Expression) -> Result<String> {
        match expr {
            Expression::Conjunction { rules, .. } if rules.is_empty() => Ok(ALWAYS_TRUE.to_string()),
            Expression::Conjunction { op, rules } => {
                let mut ordered: Vec<&Expression> = rules.iter().collect();
                if !self.priority.is_empty() {
                    ordered.sort_by_key(|rule| self.rank(rule));
                }
                let parts = ordered.into_iter().map(|rule| self.expr(rule)).collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(op.keyword())))
            }
            Expression::Atom(rule) => self.atom(rule),
        }
    }

    /// A group ranks as its best-ranked rule.
    fn rank(&self, expr: &Expression) -> usize {
        match expr {
            Expression::Atom(rule) => {
                self.priority.iter().position(|f| *f == rule.field).unwrap_or(self.priority.len())
            }
            Expression::Conjunction { rules, .. } => {
                rules.iter().map(|rule| self.rank(rule)).min().unwrap_or(self.priority.len())
            }
        }
    }

    fn atom(&mut self, rule: &AtomRule) -> Result<String> {
        let field = rule.field.as_str();
        if rule.op.checks_key() {
            return key_check(rule);
        }
        let name = unique_name(&placeholder_base(field), &mut self.used);
        let ty = self.validated.column_type(field);

        let (sql, param) = match (rule.op, &rule.value) {
            (Operator::Equal, FilterValue::Scalar(v)) => (format!("{field} = :{name}"), bind_scalar(ty, v)?),
            (Operator::NotEqual, FilterValue::Scalar(v)) => (format!("{field} != :{name}"), bind_scalar(ty, v)?),
            (Operator::GreaterThan | Operator::IdGreaterThan, FilterValue::Scalar(v)) => {
                (format!("{field} > :{name}"), bind_scalar(ty, v)?)
            }
            (Operator::GreaterThanEqual, FilterValue::Scalar(v)) => {
                (format!("{field} >= :{name}"), bind_scalar(ty, v)?)
            }
            (Operator::LessThan, FilterValue::Scalar(v)) => (format!("{field} < :{name}"), bind_scalar(ty, v)?),
            (Operator::LessThanEqual, FilterValue::Scalar(v)) => {
                (format!("{field} <= :{name}"), bind_scalar(ty, v)?)
            }
            (Operator::In, FilterValue::List(vs)) => (format!("{field} IN (:{name})"), bind_list(ty, vs)?),
            (Operator::NotIn, FilterValue::List(vs)) => {
                (format!("{field} NOT IN (:{name})"), bind_list(ty, vs)?)
            }
            (Operator::ContainsSensitive, FilterValue::Scalar(Value::String(Some(s)))) => {
                let pattern = format!("*{}*", glob_escape(s));
                (format!("{field} GLOB :{name}"), Param::Value(pattern.into()))
            }
            (Operator::ContainsInsensitive, FilterValue::Scalar(Value::String(Some(s)))) => {
                let pattern = format!("%{}%", s.to_lowercase());
                (format!("LOWER({field}) LIKE :{name}"), Param::Value(pattern.into()))
            }
            (Operator::JsonEqual, FilterValue::Scalar(v)) => {
                (format!("{} = :{name}", json_extract(field)?), Param::Value(v.clone()))
            }
            (Operator::JsonNotEqual, FilterValue::Scalar(v)) => {
                (format!("{} != :{name}", json_extract(field)?), Param::Value(v.clone()))
            }
            (Operator::JsonIn, FilterValue::List(vs)) => {
                (format!("{} IN (:{name})", json_extract(field)?), Param::List(vs.clone()))
            }
            (Operator::JsonContains, FilterValue::Scalar(v)) => {
                let (column, path) = json_path(field)?;
                let sql = format!("EXISTS (SELECT 1 FROM json_each({column}, '{path}') WHERE value = :{name})");
                (sql, Param::Value(v.clone()))
            }
            (Operator::JsonOverlaps, FilterValue::List(vs)) => {
                let (column, path) = json_path(field)?;
                let sql = format!("EXISTS (SELECT 1 FROM json_each({column}, '{path}') WHERE value IN (:{name}))");
                (sql, Param::List(vs.clone()))
            }
            (Operator::JsonLength, FilterValue::Scalar(v)) => {
                let (column, path) = json_path(field)?;
                (format!("json_array_length({column}, '{path}') = :{name}"), Param::Value(v.clone()))
            }
            (op, _) => return Err(invalid_parameter!("operator {op} does not accept the value of `{field}`")),
        };

        self.params.insert(name, param);
        Ok(sql)
    }
}

/// Lowers a key path check. The path is inlined, so the rule binds nothing.
fn key_check(rule: &AtomRule) -> Result<String> {
    let field = rule.field.as_str();
    let FilterValue::Scalar(Value::String(Some(key))) = &rule.value else {
        return Err(invalid_parameter!("operator {} on `{field}` needs a key path", rule.op));
    };
    let full = format!("{field}.{key}");
    let (column, path) = json_path(&full)?;
    let test = if rule.op == Operator::JsonContainsPath { "IS NOT NULL" } else { "IS NULL" };
    Ok(format!("json_type({column}, '{path}') {test}"))
}

fn bind_scalar(ty: Option<ColumnType>, value: &Value) -> Result<Param> {
    Ok(Param::Value(bind_value(ty, value)?))
}

fn bind_list(ty: Option<ColumnType>, values: &[Value]) -> Result<Param> {
    let values = values.iter().map(|v| bind_value(ty, v)).collect::<Result<Vec<_>>>()?;
    Ok(Param::List(values))
}

/// Time columns are compared as UTC timestamps whatever offset the caller used.
fn bind_value(ty: Option<ColumnType>, value: &Value) -> Result<Value> {
    match (ty, value) {
        (Some(ColumnType::Time), Value::String(Some(s))) => {
            let parsed = DateTime::parse_from_rfc3339(s)
                .map_err(|e| invalid_parameter!("invalid time `{s}`: {e}"))?;
            Ok(Value::ChronoDateTimeUtc(Some(Box::new(parsed.with_timezone(&Utc)))))
        }
        _ => Ok(value.clone()),
    }
}

fn placeholder_base(field: &str) -> String {
    field.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

fn unique_name(base: &str, used: &mut BTreeSet<String>) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn json_path(field: &str) -> Result<(&str, String)> {
    let (column, keys) =
        field.split_once('.').ok_or_else(|| invalid_parameter!("`{field}` is not a JSON path"))?;
    let path = keys.split('.').fold(String::from("$"), |mut path, key| {
        path.push_str(".\"");
        path.push_str(key);
        path.push('"');
        path
    });
    Ok((column, path))
}

fn json_extract(field: &str) -> Result<String> {
    let (column, path) = json_path(field)?;
    Ok(format!("{column}->>'{path}'"))
}

fn glob_escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' | '?' | '[' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}
