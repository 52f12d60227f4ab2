//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_orm::{ColumnDescriptor, ColumnType, Columns, Json, MergeOption, Table, record};

pub static REVISION_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("creator", ColumnType::String),
    ColumnDescriptor::new("reviser", ColumnType::String),
    ColumnDescriptor::new("created_at", ColumnType::Time),
    ColumnDescriptor::new("updated_at", ColumnType::Time),
];

pub static SUBNET_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("id", ColumnType::String),
    ColumnDescriptor::new("vendor", ColumnType::String),
    ColumnDescriptor::new("name", ColumnType::String),
    ColumnDescriptor::new("bk_biz_id", ColumnType::Numeric),
    ColumnDescriptor::new("memo", ColumnType::String),
    ColumnDescriptor::new("extension", ColumnType::Json),
];

static SUBNET_TABLE: LazyLock<Columns> =
    LazyLock::new(|| Columns::merge(&MergeOption::default(), &[SUBNET_COLUMNS, REVISION_COLUMNS]));

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Revision {
        pub creator: String => "creator",
        pub reviser: String => "reviser",
        pub created_at: DateTime<Utc> => "created_at",
        pub updated_at: DateTime<Utc> => "updated_at",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetExtension {
    pub vpc_id: String,
    pub zones: Vec<String>,
}

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Subnet {
        pub id: String => "id",
        pub vendor: String => "vendor",
        pub name: String => "name",
        pub bk_biz_id: i64 => "bk_biz_id",
        pub memo: Option<String> => "memo",
        pub extension: Option<Json<SubnetExtension>> => "extension",
        pub revision: Revision => "revision",
    }
}

impl Table for Subnet {
    const NAME: &'static str = "subnet";

    fn columns() -> &'static Columns {
        &SUBNET_TABLE
    }

    fn rule_fields() -> BTreeMap<String, ColumnType> {
        let mut fields = Self::columns().column_types();
        fields.insert("extension.vpc_id".to_string(), ColumnType::String);
        fields.insert("extension.zones".to_string(), ColumnType::String);
        fields
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// A subnet as submitted by a caller, before ids and audit columns exist.
pub fn subnet(name: &str, bk_biz_id: i64) -> Subnet {
    Subnet {
        vendor: "tcloud".to_string(),
        name: name.to_string(),
        bk_biz_id,
        extension: Some(Json(SubnetExtension {
            vpc_id: "vpc-1".to_string(),
            zones: vec!["ap-guangzhou-1".to_string()],
        })),
        revision: Revision {
            creator: "admin".to_string(),
            reviser: "admin".to_string(),
            ..Revision::default()
        },
        ..Subnet::default()
    }
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' if !in_single_quote => {}
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!("expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`");
        }
    }
}
