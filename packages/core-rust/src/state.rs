//! Interaction state: the sole input to query construction.
//!
//! Fields are private and change only through the mutation methods below, each
//! of which reports whether anything actually changed. The whole struct is
//! query-affecting and is serialized verbatim into the result fingerprint.

use serde::{Deserialize, Serialize};

/// Page size used by a fresh [`InteractionState`].
pub const DEFAULT_PAGE_SIZE: u32 = 10;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Sort direction for query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

/// Filter operators. Which ones apply depends on the column's
/// [`ValueType`](crate::ValueType).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    /// Case-insensitive substring match (text).
    Contains,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Same calendar day (date).
    On,
    /// Inclusive calendar-day range (date).
    Between,
    /// Equals one of a set of options (select).
    OneOf,
}

/// Current value of the column filter as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum FilterValue {
    Single(String),
    OneOf(Vec<String>),
    Between {
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },
}

impl FilterValue {
    /// Empty values mean "no condition", never "match the empty string".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        fn blank(s: &str) -> bool {
            s.trim().is_empty()
        }
        match self {
            Self::Single(s) => blank(s),
            Self::OneOf(items) => items.iter().all(|s| blank(s)),
            Self::Between { from, to } => {
                from.as_deref().is_none_or(blank) && to.as_deref().is_none_or(blank)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InteractionState
// ---------------------------------------------------------------------------

/// Everything the user has done to the table that affects which rows come back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    search_term: String,
    filter_column: Option<String>,
    filter_operator: Option<FilterOperator>,
    filter_value: Option<FilterValue>,
    date_range_start: Option<String>,
    date_range_end: Option<String>,
    sort_column: Option<String>,
    sort_direction: SortDirection,
    page_number: u32,
    page_size: u32,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            filter_column: None,
            filter_operator: None,
            filter_value: None,
            date_range_start: None,
            date_range_end: None,
            sort_column: None,
            sort_direction: SortDirection::Asc,
            page_number: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InteractionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Accessors ---

    #[must_use]
    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    #[must_use]
    pub fn filter_column(&self) -> Option<&str> {
        self.filter_column.as_deref()
    }

    #[must_use]
    pub fn filter_operator(&self) -> Option<FilterOperator> {
        self.filter_operator
    }

    #[must_use]
    pub fn filter_value(&self) -> Option<&FilterValue> {
        self.filter_value.as_ref()
    }

    #[must_use]
    pub fn date_range(&self) -> (Option<&str>, Option<&str>) {
        (
            self.date_range_start.as_deref(),
            self.date_range_end.as_deref(),
        )
    }

    #[must_use]
    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column.as_deref()
    }

    #[must_use]
    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Zero-based row offset of the current page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page_number.saturating_sub(1)) * u64::from(self.page_size)
    }

    // --- Mutations ---
    //
    // Anything that changes the result set (search, filter, date range, page
    // size) moves back to page 1. Each method returns whether state changed.

    pub fn set_search_term(&mut self, term: impl Into<String>) -> bool {
        let term = term.into();
        if self.search_term == term {
            return false;
        }
        self.search_term = term;
        self.page_number = 1;
        true
    }

    /// Selects the filter column. Changing the column discards the previous
    /// operator and value, which belonged to the old column.
    pub fn set_filter_column(&mut self, column: Option<String>) -> bool {
        if self.filter_column == column {
            return false;
        }
        self.filter_column = column;
        self.filter_operator = None;
        self.filter_value = None;
        self.page_number = 1;
        true
    }

    pub fn set_filter_operator(&mut self, operator: Option<FilterOperator>) -> bool {
        if self.filter_operator == operator {
            return false;
        }
        self.filter_operator = operator;
        self.page_number = 1;
        true
    }

    pub fn set_filter_value(&mut self, value: Option<FilterValue>) -> bool {
        if self.filter_value == value {
            return false;
        }
        self.filter_value = value;
        self.page_number = 1;
        true
    }

    /// Removes the column filter entirely.
    pub fn clear_filter(&mut self) -> bool {
        if self.filter_column.is_none()
            && self.filter_operator.is_none()
            && self.filter_value.is_none()
        {
            return false;
        }
        self.filter_column = None;
        self.filter_operator = None;
        self.filter_value = None;
        self.page_number = 1;
        true
    }

    pub fn set_date_range(&mut self, start: Option<String>, end: Option<String>) -> bool {
        if self.date_range_start == start && self.date_range_end == end {
            return false;
        }
        self.date_range_start = start;
        self.date_range_end = end;
        self.page_number = 1;
        true
    }

    /// Header-click sorting: a new column sorts ascending, the current column
    /// flips direction.
    pub fn sort_by(&mut self, column: impl Into<String>) -> bool {
        let column = column.into();
        if self.sort_column.as_deref() == Some(column.as_str()) {
            self.sort_direction = self.sort_direction.toggled();
        } else {
            self.sort_column = Some(column);
            self.sort_direction = SortDirection::Asc;
        }
        true
    }

    pub fn set_sort(&mut self, column: Option<String>, direction: SortDirection) -> bool {
        if self.sort_column == column && self.sort_direction == direction {
            return false;
        }
        self.sort_column = column;
        self.sort_direction = direction;
        true
    }

    /// Moves to `page`. Page numbers are 1-based; 0 is treated as 1.
    pub fn set_page(&mut self, page: u32) -> bool {
        let page = page.max(1);
        if self.page_number == page {
            return false;
        }
        self.page_number = page;
        true
    }

    /// Sets the page size, clamped to `1..=max_page_size`.
    pub fn set_page_size(&mut self, size: u32, max_page_size: u32) -> bool {
        let size = size.clamp(1, max_page_size.max(1));
        if self.page_size == size {
            return false;
        }
        self.page_size = size;
        self.page_number = 1;
        true
    }
}
