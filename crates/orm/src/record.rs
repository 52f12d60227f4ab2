use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_query::Value;
use serde::Serialize;

use crate::error::{Error, Result};

/// A struct whose fields map onto table columns.
///
/// Implemented by the [`record!`](crate::record!) macro.
pub trait Record {
    /// Type name, used in error messages.
    fn name(&self) -> &'static str;

    /// Hands every field to `visitor` in declaration order, stopping at the first
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by `visitor`.
    fn visit_fields(&self, visitor: &mut dyn FnMut(FieldRef<'_>) -> Result<()>) -> Result<()>;
}

/// One field of a record as seen by a visitor.
pub struct FieldRef<'a> {
    /// Rust field name.
    pub name: &'static str,
    /// Column annotation, if any.
    pub column: Option<&'static str>,
    /// The field's value.
    pub value: &'a dyn ToField,
}

/// How a leaf value was declared, which decides when an update includes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// A plain value. Changed when not the zero value.
    Scalar,
    /// An `Option` value. Changed when `Some`.
    Optional,
    /// A self-encoding value such as a JSON document. Changed when not null.
    Codec,
}

/// A storable column value.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// The value to bind.
    pub value: Value,
    /// How the value was declared.
    pub kind: LeafKind,
}

impl Leaf {
    /// Whether the value is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        crate::validate::is_null(&self.value)
    }
}

/// What a field contributes when flattened.
pub enum FieldValue<'a> {
    /// A single column value.
    Leaf(Leaf),
    /// A nested record whose fields are merged into the parent's columns.
    Nested(&'a dyn Record),
    /// Nothing, e.g. an unset optional sub-record.
    Absent,
}

impl FieldValue<'_> {
    const fn scalar(value: Value) -> Self {
        Self::Leaf(Leaf {
            value,
            kind: LeafKind::Scalar,
        })
    }

    const fn optional(value: Value) -> Self {
        Self::Leaf(Leaf {
            value,
            kind: LeafKind::Optional,
        })
    }

    const fn codec(value: Value) -> Self {
        Self::Leaf(Leaf {
            value,
            kind: LeafKind::Codec,
        })
    }
}

/// Converts a field into its flattened form.
pub trait ToField {
    /// The field's contribution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if a codec value cannot be encoded.
    fn to_field(&self) -> Result<FieldValue<'_>>;

    /// The contribution of an unset `Option<Self>`.
    fn absent() -> FieldValue<'static>
    where
        Self: Sized;
}

macro_rules! copy_fields {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToField for $ty {
                fn to_field(&self) -> Result<FieldValue<'_>> {
                    Ok(FieldValue::scalar(Value::from(*self)))
                }

                fn absent() -> FieldValue<'static> {
                    FieldValue::optional(Value::$variant(None))
                }
            }
        )*
    };
}

macro_rules! clone_fields {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToField for $ty {
                fn to_field(&self) -> Result<FieldValue<'_>> {
                    Ok(FieldValue::scalar(Value::from(self.clone())))
                }

                fn absent() -> FieldValue<'static> {
                    FieldValue::optional(Value::$variant(None))
                }
            }
        )*
    };
}

copy_fields! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    u8 => TinyUnsigned,
    u16 => SmallUnsigned,
    u32 => Unsigned,
    u64 => BigUnsigned,
    f32 => Float,
    f64 => Double,
    char => Char,
    DateTime<Utc> => ChronoDateTimeUtc,
    NaiveDate => ChronoDate,
}

clone_fields! {
    String => String,
    Vec<u8> => Bytes,
}

impl ToField for serde_json::Value {
    fn to_field(&self) -> Result<FieldValue<'_>> {
        if self.is_null() {
            return Ok(Self::absent());
        }
        Ok(FieldValue::codec(Value::Json(Some(Box::new(self.clone())))))
    }

    fn absent() -> FieldValue<'static> {
        FieldValue::codec(Value::Json(None))
    }
}

/// Stores a serializable value as a JSON document column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> ToField for Json<T> {
    fn to_field(&self) -> Result<FieldValue<'_>> {
        let value = serde_json::to_value(&self.0)?;
        if value.is_null() {
            return Ok(Self::absent());
        }
        Ok(FieldValue::codec(Value::Json(Some(Box::new(value)))))
    }

    fn absent() -> FieldValue<'static> {
        FieldValue::codec(Value::Json(None))
    }
}

impl<T: ToField> ToField for Option<T> {
    fn to_field(&self) -> Result<FieldValue<'_>> {
        let Some(inner) = self else {
            return Ok(T::absent());
        };
        Ok(match inner.to_field()? {
            FieldValue::Leaf(Leaf {
                value,
                kind: LeafKind::Scalar,
            }) => FieldValue::Leaf(Leaf {
                value,
                kind: LeafKind::Optional,
            }),
            other => other,
        })
    }

    fn absent() -> FieldValue<'static> {
        T::absent()
    }
}

impl<T: ToField> ToField for Box<T> {
    fn to_field(&self) -> Result<FieldValue<'_>> {
        (**self).to_field()
    }

    fn absent() -> FieldValue<'static> {
        T::absent()
    }
}

/// Column to value map of a flattened record.
pub type Flattened = BTreeMap<&'static str, Leaf>;

/// Flattens a record, recursing into nested records, into a column to value map.
///
/// A column written by more than one field keeps the value of the field declared
/// last.
///
/// # Errors
///
/// Returns [`Error::MissingAnnotation`] for the first field without a column.
pub fn flatten(record: &dyn Record) -> Result<Flattened> {
    let mut flattened = Flattened::new();
    flatten_into(record, &mut flattened)?;
    Ok(flattened)
}

fn flatten_into(record: &dyn Record, out: &mut Flattened) -> Result<()> {
    let record_name = record.name();
    record.visit_fields(&mut |field| {
        let Some(column) = field.column else {
            return Err(Error::MissingAnnotation {
                record: record_name,
                field: field.name,
            });
        };
        match field.value.to_field()? {
            FieldValue::Leaf(leaf) => {
                out.insert(column, leaf);
            }
            FieldValue::Nested(nested) => flatten_into(nested, out)?,
            FieldValue::Absent => {}
        }
        Ok(())
    })
}

/// Declares a record: a struct whose fields map onto columns.
///
/// Each field names its column with `=> "column"`. Fields holding another record
/// are flattened into the same columns, and their annotation only marks them as
/// storable.
///
/// # Examples
///
/// ```ignore
/// record! {
///     #[derive(Debug, Clone, Default)]
///     pub struct Subnet {
///         pub id: String => "id",
///         pub name: String => "name",
///         pub extension: Json<Extension> => "extension",
///         pub revision: Revision => "revision",
///     }
/// }
/// ```
#[macro_export]
macro_rules! record {
    (@column) => { None };
    (@column $column:literal) => { Some($column) };
    (@decode $field:ident) => { stringify!($field) };
    (@decode $field:ident $column:literal) => { $column };

    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field:ident : $ty:ty $(=> $column:literal)?
            ),* $(,)?
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$meta])*
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl $crate::Record for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn visit_fields(
                &self,
                visitor: &mut dyn FnMut($crate::FieldRef<'_>) -> $crate::Result<()>,
            ) -> $crate::Result<()> {
                $(
                    visitor($crate::FieldRef {
                        name: stringify!($field),
                        column: $crate::record!(@column $($column)?),
                        value: &self.$field,
                    })?;
                )*
                Ok(())
            }
        }

        impl $crate::ToField for $name {
            fn to_field(&self) -> $crate::Result<$crate::FieldValue<'_>> {
                Ok($crate::FieldValue::Nested(self))
            }

            fn absent() -> $crate::FieldValue<'static> {
                $crate::FieldValue::Absent
            }
        }

        impl $crate::FromRow for $name {
            fn from_row(row: &$crate::Row) -> $crate::Result<Self> {
                Ok(Self {
                    $(
                        $field: <$ty as $crate::FetchValue>::fetch(
                            row,
                            $crate::record!(@decode $field $($column)?),
                        )?,
                    )*
                })
            }

            fn present(row: &$crate::Row) -> bool {
                false $(|| <$ty as $crate::FetchValue>::present(row, $crate::record!(@decode $field $($column)?)))*
            }
        }

        impl $crate::FetchValue for $name {
            fn fetch(row: &$crate::Row, _column: &str) -> $crate::Result<Self> {
                <Self as $crate::FromRow>::from_row(row)
            }

            fn present(row: &$crate::Row, _column: &str) -> bool {
                <Self as $crate::FromRow>::present(row)
            }
        }
    };
}
