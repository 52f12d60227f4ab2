use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::column::ColumnType;
use crate::error::Result;
use crate::{invalid_parameter, schema_violation};

/// Maximum page size accepted unless configured otherwise.
pub const DEFAULT_MAX_PAGE_LIMIT: u32 = 500;

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Page specification supplied with a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    /// Only count matching rows. Start, limit and sort are ignored.
    pub count: bool,
    /// Rows to skip.
    pub start: u32,
    /// Rows to return.
    pub limit: u32,
    /// Sort column. Falls back to [`PageOption::default_sort`].
    pub sort: Option<String>,
    /// Sort direction.
    pub order: Order,
}

impl Page {
    /// A count-only page.
    #[must_use]
    pub fn count() -> Self {
        Self {
            count: true,
            ..Self::default()
        }
    }

    /// A page of `limit` rows starting at `start`.
    #[must_use]
    pub fn new(start: u32, limit: u32) -> Self {
        Self {
            start,
            limit,
            ..Self::default()
        }
    }

    /// Sets the sort column and direction.
    #[must_use]
    pub fn sort_by(mut self, sort: impl Into<String>, order: Order) -> Self {
        self.sort = Some(sort.into());
        self.order = order;
        self
    }

    fn sort_column(&self) -> Option<&str> {
        self.sort.as_deref().filter(|sort| !sort.is_empty())
    }

    /// Checks the page against the page limits and the table's columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) when the
    /// limit is zero or above the ceiling, and
    /// [`Error::SchemaViolation`](crate::Error::SchemaViolation) when the sort column
    /// is unknown.
    pub fn validate(&self, opt: &PageOption, columns: &BTreeMap<String, ColumnType>) -> Result<()> {
        if self.count {
            return Ok(());
        }
        if self.limit == 0 {
            return Err(invalid_parameter!("page.limit is required"));
        }
        if self.limit > opt.max_limit {
            return Err(invalid_parameter!(
                "page.limit {} exceeds the maximum of {}",
                self.limit,
                opt.max_limit
            ));
        }
        if let Some(sort) = self.sort_column()
            && !columns.contains_key(sort)
        {
            return Err(schema_violation!("page.sort `{sort}` is not a known column"));
        }
        Ok(())
    }

    /// Renders the `ORDER BY ... LIMIT ... OFFSET ...` suffix. Count pages render
    /// nothing, leaving the caller to wrap its predicate in `COUNT(*)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`](crate::Error::InvalidParameter) if the sort
    /// column is not a plain identifier.
    pub fn compile(&self, opt: &PageOption) -> Result<String> {
        if self.count {
            return Ok(String::new());
        }

        let sort = self.sort_column().unwrap_or(opt.default_sort.as_str());
        if sort.is_empty() || !sort.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid_parameter!("page.sort `{sort}` is not a column name"));
        }

        Ok(format!("ORDER BY {sort} {} LIMIT {} OFFSET {}", self.order.keyword(), self.limit, self.start))
    }
}

/// Limits applied to pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOption {
    /// Largest accepted `limit`.
    pub max_limit: u32,
    /// Sort column used when a page names none. Should be unique so repeated
    /// pages are stable.
    pub default_sort: String,
}

impl Default for PageOption {
    fn default() -> Self {
        Self {
            max_limit: DEFAULT_MAX_PAGE_LIMIT,
            default_sort: "id".to_string(),
        }
    }
}

impl PageOption {
    /// Sets the largest accepted limit.
    #[must_use]
    pub const fn max_limit(mut self, max_limit: u32) -> Self {
        self.max_limit = max_limit;
        self
    }

    /// Sets the fallback sort column.
    #[must_use]
    pub fn default_sort(mut self, column: impl Into<String>) -> Self {
        self.default_sort = column.into();
        self
    }
}
