//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::{LazyLock, Once};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratus_orm::{ColumnDescriptor, ColumnType, Columns, Json, MergeOption, Table, record};
use stratus_store::{Backend, ConnectOptions, Database, Kit, SqlIdAllocator};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

pub static REVISION_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("creator", ColumnType::String),
    ColumnDescriptor::new("reviser", ColumnType::String),
    ColumnDescriptor::new("created_at", ColumnType::Time),
    ColumnDescriptor::new("updated_at", ColumnType::Time),
];

pub static VPC_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("id", ColumnType::String),
    ColumnDescriptor::new("vendor", ColumnType::String),
    ColumnDescriptor::new("name", ColumnType::String),
    ColumnDescriptor::new("region", ColumnType::String),
    ColumnDescriptor::new("bk_biz_id", ColumnType::Numeric),
    ColumnDescriptor::new("memo", ColumnType::String),
    ColumnDescriptor::new("extension", ColumnType::Json),
];

static VPC_TABLE: LazyLock<Columns> =
    LazyLock::new(|| Columns::merge(&MergeOption::default(), &[VPC_COLUMNS, REVISION_COLUMNS]));

pub const VPC_DDL: &str = "CREATE TABLE vpc (
    id TEXT PRIMARY KEY,
    vendor TEXT NOT NULL,
    name TEXT NOT NULL,
    region TEXT NOT NULL,
    bk_biz_id INTEGER NOT NULL,
    memo TEXT,
    extension TEXT,
    creator TEXT NOT NULL,
    reviser TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

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
pub struct VpcExtension {
    pub cidr: String,
    pub cloud_ids: Vec<String>,
}

record! {
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Vpc {
        pub id: String => "id",
        pub vendor: String => "vendor",
        pub name: String => "name",
        pub region: String => "region",
        pub bk_biz_id: i64 => "bk_biz_id",
        pub memo: Option<String> => "memo",
        pub extension: Option<Json<VpcExtension>> => "extension",
        pub revision: Revision => "revision",
    }
}

impl Table for Vpc {
    const NAME: &'static str = "vpc";

    fn columns() -> &'static Columns {
        &VPC_TABLE
    }

    fn rule_fields() -> std::collections::BTreeMap<String, ColumnType> {
        let mut fields = Self::columns().column_types();
        fields.insert("extension.cidr".to_string(), ColumnType::String);
        fields.insert("extension.cloud_ids".to_string(), ColumnType::String);
        fields
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// A vpc as submitted by a caller, before ids and audit columns exist.
pub fn vpc(name: &str, region: &str, bk_biz_id: i64) -> Vpc {
    Vpc {
        vendor: "aws".to_string(),
        name: name.to_string(),
        region: region.to_string(),
        bk_biz_id,
        extension: Some(Json(VpcExtension {
            cidr: "10.0.0.0/16".to_string(),
            cloud_ids: vec![format!("vpc-{name}")],
        })),
        revision: Revision {
            creator: "admin".to_string(),
            reviser: "admin".to_string(),
            ..Revision::default()
        },
        ..Vpc::default()
    }
}

/// Installs a log subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = Registry::default().with(EnvFilter::new("debug")).with(fmt::layer().with_test_writer()).try_init();
    });
}

/// A fresh in-memory database with the vpc table and the id counter.
pub fn database() -> Database {
    init_tracing();
    let db = Database::connect_with(ConnectOptions::in_memory()).expect("connect");
    db.execute_batch(VPC_DDL).expect("create vpc table");
    SqlIdAllocator::migrate(&db, &kit()).expect("create id_generator");
    db
}

pub fn kit() -> Kit {
    Kit::new("test-rid")
}
