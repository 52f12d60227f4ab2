use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical columns whose insert placeholder is the database clock.
const CLOCK_PLACEHOLDER: &str = "now()";

/// Logical column type, used only to check filter values against a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Text columns.
    String,
    /// Integer and floating point columns.
    Numeric,
    /// Boolean columns.
    Boolean,
    /// Timestamp columns, stored as RFC 3339 UTC text.
    Time,
    /// JSON documents.
    Json,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Time => "time",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Describes one storable column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Physical column name.
    pub column: &'static str,
    /// Alias used when the column belongs to a nested sub-record, e.g. `spec.name`.
    pub named: Cow<'static, str>,
    /// Logical type.
    pub ty: ColumnType,
}

impl ColumnDescriptor {
    /// A descriptor whose named form is the column itself.
    #[must_use]
    pub const fn new(column: &'static str, ty: ColumnType) -> Self {
        Self {
            column,
            named: Cow::Borrowed(column),
            ty,
        }
    }

    /// A descriptor with an explicit named form.
    #[must_use]
    pub const fn named(column: &'static str, named: &'static str, ty: ColumnType) -> Self {
        Self {
            column,
            named: Cow::Borrowed(named),
            ty,
        }
    }
}

/// Concatenates descriptor lists, prefixing every named form when `prefix` is non-empty.
#[must_use]
pub fn merge_descriptors(prefix: &str, lists: &[&[ColumnDescriptor]]) -> Vec<ColumnDescriptor> {
    lists
        .iter()
        .flat_map(|list| list.iter())
        .map(|desc| {
            if prefix.is_empty() {
                desc.clone()
            } else {
                ColumnDescriptor {
                    column: desc.column,
                    named: Cow::Owned(format!("{prefix}.{}", desc.named)),
                    ty: desc.ty,
                }
            }
        })
        .collect()
}

/// Options applied when building a [`Columns`] registry.
#[derive(Debug, Clone, Default)]
pub struct MergeOption {
    /// Leave `id` out of the insert expressions. The primary key is then assigned
    /// by the database rather than by the identifier allocator.
    pub insert_without_primary_id: bool,
}

impl MergeOption {
    /// Excludes the `id` column from insert expressions.
    #[must_use]
    pub const fn insert_without_primary_id() -> Self {
        Self {
            insert_without_primary_id: true,
        }
    }
}

/// Immutable, per-table column schema.
///
/// Built once per table, usually inside a `LazyLock`, and read concurrently
/// afterwards.
#[derive(Debug, Clone)]
pub struct Columns {
    descriptors: Vec<ColumnDescriptor>,
    insert_columns: Vec<&'static str>,
    column_expr: String,
    named_expr: String,
    colon_name_expr: String,
}

impl Columns {
    /// Builds a registry from one or more descriptor lists.
    ///
    /// A physical column that appears again replaces the earlier descriptor in its
    /// original position.
    #[must_use]
    pub fn merge(option: &MergeOption, lists: &[&[ColumnDescriptor]]) -> Self {
        let mut descriptors: Vec<ColumnDescriptor> = Vec::new();
        for desc in lists.iter().flat_map(|list| list.iter()) {
            if let Some(existing) = descriptors.iter_mut().find(|d| d.column == desc.column) {
                *existing = desc.clone();
            } else {
                descriptors.push(desc.clone());
            }
        }

        let insert: Vec<&ColumnDescriptor> = descriptors
            .iter()
            .filter(|d| !(option.insert_without_primary_id && d.column == "id"))
            .collect();
        let insert_columns = insert.iter().map(|d| d.column).collect::<Vec<_>>();
        let column_expr = insert_columns.join(", ");
        let colon_name_expr = insert
            .iter()
            .map(|d| {
                if d.ty == ColumnType::Time {
                    CLOCK_PLACEHOLDER.to_string()
                } else {
                    format!(":{}", d.column)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let named_expr = descriptors.iter().map(named_column).collect::<Vec<_>>().join(", ");

        Self {
            descriptors,
            insert_columns,
            column_expr,
            named_expr,
            colon_name_expr,
        }
    }

    /// Builds a registry from a single descriptor list with default options.
    #[must_use]
    pub fn from_descriptors(descriptors: &[ColumnDescriptor]) -> Self {
        Self::merge(&MergeOption::default(), &[descriptors])
    }

    /// Ordered physical column names.
    #[must_use]
    pub fn columns(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|d| d.column).collect()
    }

    /// Columns written by `INSERT`, in order.
    #[must_use]
    pub fn insert_columns(&self) -> &[&'static str] {
        &self.insert_columns
    }

    /// All descriptors, in order.
    #[must_use]
    pub fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.descriptors
    }

    /// Looks up the descriptor of a physical column.
    #[must_use]
    pub fn descriptor(&self, column: &str) -> Option<&ColumnDescriptor> {
        self.descriptors.iter().find(|d| d.column == column)
    }

    /// Whether `column` is a known physical column.
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.descriptor(column).is_some()
    }

    /// Column to type map. The copy is owned so callers can add JSON path fields
    /// such as `extension.vpc_id` before validating.
    #[must_use]
    pub fn column_types(&self) -> BTreeMap<String, ColumnType> {
        self.descriptors.iter().map(|d| (d.column.to_string(), d.ty)).collect()
    }

    /// Column to type map without the given columns.
    #[must_use]
    pub fn without_column(&self, columns: &[&str]) -> BTreeMap<String, ColumnType> {
        let mut types = self.column_types();
        for column in columns {
            types.remove(*column);
        }
        types
    }

    /// `INSERT` column list, e.g. `id, name, memo`.
    #[must_use]
    pub fn column_expr(&self) -> &str {
        &self.column_expr
    }

    /// Full `SELECT` projection, e.g. `id, name AS "spec.name"`.
    #[must_use]
    pub fn named_expr(&self) -> &str {
        &self.named_expr
    }

    /// `SELECT` projection limited to `fields`. An empty whitelist selects every
    /// column, and unknown names are skipped.
    #[must_use]
    pub fn fields_named_expr<S: AsRef<str>>(&self, fields: &[S]) -> String {
        if fields.is_empty() {
            return self.named_expr.clone();
        }
        fields
            .iter()
            .filter_map(|field| self.descriptor(field.as_ref()))
            .map(named_column)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `SELECT` projection of every column except `excluded`.
    #[must_use]
    pub fn fields_named_expr_without(&self, excluded: &[&str]) -> String {
        self.descriptors
            .iter()
            .filter(|d| !excluded.contains(&d.column))
            .map(named_column)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `INSERT ... VALUES` placeholders, e.g. `:id, :name, now()`.
    #[must_use]
    pub fn colon_name_expr(&self) -> &str {
        &self.colon_name_expr
    }

    /// Maps a projection alias (or a plain column name) back to its physical column.
    #[must_use]
    pub fn column_for_named(&self, named: &str) -> Option<&'static str> {
        self.descriptors.iter().find(|d| d.named == named).map(|d| d.column)
    }
}

/// Whether the physical column takes the database clock on insert.
pub(crate) fn is_clock_column(columns: &Columns, column: &str) -> bool {
    columns.descriptor(column).is_some_and(|d| d.ty == ColumnType::Time)
}

fn named_column(desc: &ColumnDescriptor) -> String {
    if desc.named == desc.column {
        desc.column.to_string()
    } else {
        format!("{} AS \"{}\"", desc.column, desc.named)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static REVISION: &[ColumnDescriptor] = &[
        ColumnDescriptor::new("creator", ColumnType::String),
        ColumnDescriptor::new("reviser", ColumnType::String),
        ColumnDescriptor::new("created_at", ColumnType::Time),
        ColumnDescriptor::new("updated_at", ColumnType::Time),
    ];

    static SUBNET: &[ColumnDescriptor] = &[
        ColumnDescriptor::new("id", ColumnType::String),
        ColumnDescriptor::new("name", ColumnType::String),
        ColumnDescriptor::new("bk_biz_id", ColumnType::Numeric),
        ColumnDescriptor::new("extension", ColumnType::Json),
    ];

    #[test]
    fn expressions_follow_descriptor_order() {
        let columns = Columns::merge(&MergeOption::default(), &[SUBNET, REVISION]);

        assert_eq!(
            columns.columns(),
            vec!["id", "name", "bk_biz_id", "extension", "creator", "reviser", "created_at", "updated_at"]
        );
        assert_eq!(
            columns.column_expr(),
            "id, name, bk_biz_id, extension, creator, reviser, created_at, updated_at"
        );
        assert_eq!(
            columns.colon_name_expr(),
            ":id, :name, :bk_biz_id, :extension, :creator, :reviser, now(), now()"
        );
    }

    #[test]
    fn insert_without_primary_id() {
        let columns = Columns::merge(&MergeOption::insert_without_primary_id(), &[SUBNET]);

        assert_eq!(columns.column_expr(), "name, bk_biz_id, extension");
        assert_eq!(columns.colon_name_expr(), ":name, :bk_biz_id, :extension");
        // still selectable and filterable
        assert!(columns.named_expr().starts_with("id, "));
        assert!(columns.column_types().contains_key("id"));
    }

    #[test]
    fn later_descriptor_wins_in_place() {
        static OVERRIDE: &[ColumnDescriptor] = &[ColumnDescriptor::new("name", ColumnType::Json)];
        let columns = Columns::merge(&MergeOption::default(), &[SUBNET, OVERRIDE]);

        assert_eq!(columns.columns(), vec!["id", "name", "bk_biz_id", "extension"]);
        assert_eq!(columns.column_types()["name"], ColumnType::Json);
    }

    #[test]
    fn prefixed_named_expressions() {
        let spec = merge_descriptors("spec", &[&SUBNET[1..3]]);
        let mut lists: Vec<ColumnDescriptor> = vec![SUBNET[0].clone()];
        lists.extend(spec);
        let columns = Columns::from_descriptors(&lists);

        assert_eq!(columns.named_expr(), r#"id, name AS "spec.name", bk_biz_id AS "spec.bk_biz_id""#);
        assert_eq!(columns.column_for_named("spec.name"), Some("name"));
        assert_eq!(columns.column_for_named("id"), Some("id"));
        assert_eq!(columns.column_for_named("name"), None);
    }

    #[test]
    fn field_whitelists() {
        let columns = Columns::merge(&MergeOption::default(), &[SUBNET, REVISION]);

        assert_eq!(columns.fields_named_expr(&["name", "missing", "id"]), "name, id");
        assert_eq!(columns.fields_named_expr::<&str>(&[]), columns.named_expr());
        assert_eq!(
            columns.fields_named_expr_without(&["extension", "creator", "reviser"]),
            "id, name, bk_biz_id, created_at, updated_at"
        );

        let types = columns.without_column(&["extension"]);
        assert!(!types.contains_key("extension"));
        assert_eq!(types.len(), 7);
    }
}
