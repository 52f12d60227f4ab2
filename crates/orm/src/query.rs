use std::collections::BTreeMap;

use sea_query::Value;

/// A bound parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A single value bound to one placeholder.
    Value(Value),
    /// A value list bound to one placeholder. The driver expands it to one
    /// positional parameter per element.
    List(Vec<Value>),
}

/// Named parameters, keyed by placeholder name without the leading `:`.
pub type Params = BTreeMap<String, Param>;

/// A compiled statement: SQL text with `:name` placeholders and their values.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// SQL text.
    pub sql: String,
    /// Bound values by placeholder name.
    pub params: Params,
}

impl Query {
    /// A statement without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// Adds a named parameter.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), Param::Value(value.into()));
        self
    }

    /// Placeholder names in order of appearance, repeats included.
    #[must_use]
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        rewrite_placeholders(&self.sql, |name| {
            names.push(name.to_string());
            None
        });
        names
    }
}

/// Rewrites every `:name` placeholder in `sql`.
///
/// `replace` receives the name without its colon and returns the replacement text,
/// or `None` to keep the placeholder. Quoted literals and identifiers are copied
/// untouched.
pub fn rewrite_placeholders(sql: &str, mut replace: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, ch)) = chars.next() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            out.push(ch);
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                out.push(ch);
            }
            ':' if chars.peek().is_some_and(|&(_, c)| c.is_ascii_alphabetic() || c == '_') => {
                let start = i + 1;
                let mut end = start;
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = j + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let name = &sql[start..end];
                match replace(name) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push(':');
                        out.push_str(name);
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    out
}
