//! Query and update compilation for Stratus resource tables.
//!
//! Turns caller-supplied filters, pages and partially filled records into
//! parameterized SQL for one table. Compilation is pure: nothing here touches a
//! database.
//!
//! # Quick Start
//!
//! ## Declare a Record
//!
//! ```ignore
//! use std::sync::LazyLock;
//!
//! use stratus_orm::{ColumnDescriptor, ColumnType, Columns, Json, MergeOption, Table, record};
//!
//! static SUBNET_COLUMNS: LazyLock<Columns> = LazyLock::new(|| {
//!     Columns::merge(&MergeOption::default(), &[&[
//!         ColumnDescriptor::new("id", ColumnType::String),
//!         ColumnDescriptor::new("name", ColumnType::String),
//!         ColumnDescriptor::new("bk_biz_id", ColumnType::Numeric),
//!         ColumnDescriptor::new("extension", ColumnType::Json),
//!         ColumnDescriptor::new("created_at", ColumnType::Time),
//!     ]])
//! });
//!
//! record! {
//!     #[derive(Debug, Clone, Default)]
//!     pub struct Subnet {
//!         pub id: String => "id",
//!         pub name: String => "name",
//!         pub bk_biz_id: i64 => "bk_biz_id",
//!         pub extension: Json<serde_json::Value> => "extension",
//!         pub created_at: String => "created_at",
//!     }
//! }
//!
//! impl Table for Subnet {
//!     const NAME: &'static str = "subnet";
//!
//!     fn columns() -> &'static Columns {
//!         &SUBNET_COLUMNS
//!     }
//!
//!     fn set_id(&mut self, id: String) {
//!         self.id = id;
//!     }
//! }
//! ```
//!
//! ## Filter and Page
//!
//! ```ignore
//! let filter = Expression::and(vec![
//!     Expression::eq("bk_biz_id", 10),
//!     Expression::cis("name", "web"),
//! ]);
//! let opt = ExprOption::new(Subnet::rule_fields());
//! let clause = filter.validate(&opt)?.compile()?;
//! // WHERE (bk_biz_id = :bk_biz_id AND LOWER(name) LIKE :name)
//!
//! let query = SelectBuilder::<Subnet>::new()
//!     .r#where(clause)
//!     .page(&Page::new(0, 50), &PageOption::default())
//!     .build()?;
//! ```
//!
//! ## Partial Updates
//!
//! ```ignore
//! let patch = Subnet { name: String::new(), ..Subnet::default() };
//! let set = compile_update(&patch, &FieldPolicy::new().add_blanked_fields(["name"]))?;
//! // SET name = :name, updated_at = now()
//! let query = UpdateBuilder::<Subnet>::new(set).r#where(clause).build()?;
//! ```

mod column;
mod delete;
mod entity;
mod error;
mod filter;
mod insert;
mod page;
mod predicate;
mod query;
mod record;
mod select;
mod update;
mod validate;

pub use column::{ColumnDescriptor, ColumnType, Columns, MergeOption, merge_descriptors};
pub use delete::DeleteBuilder;
pub use entity::{FetchValue, FromRow, Row, Table, format_timestamp, parse_timestamp};
pub use error::{Error, Result};
pub use filter::{AtomRule, Expression, FilterValue, LogicOp, Operator};
pub use insert::InsertBuilder;
pub use page::{DEFAULT_MAX_PAGE_LIMIT, Order, Page, PageOption};
pub use predicate::{CompileOption, WhereClause};
pub use query::{Param, Params, Query, rewrite_placeholders};
pub use record::{FieldRef, FieldValue, Flattened, Json, Leaf, LeafKind, Record, ToField, flatten};
// Value type of bound parameters and fetched rows.
pub use sea_query::Value;
pub use select::SelectBuilder;
pub use update::{FieldPolicy, SetClause, UpdateBuilder, compile_update};
pub use validate::{
    DEFAULT_MAX_IN_LIMIT, DEFAULT_MAX_NOT_IN_LIMIT, DEFAULT_MAX_RULES_LIMIT, ExprOption, ListOption,
    Validated, validate,
};
