//! Paging and sorting: parameter validation and page arithmetic. No I/O.

use crate::error::StoreError;
use crate::schema::Field;
use serde::Serialize;

pub const DEFAULT_PAGE_NUMBER: u32 = 0;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(number: u32, size: u32) -> Result<Self, StoreError> {
        if size == 0 {
            return Err(StoreError::Validation("page size must be greater than 0".into()));
        }
        let request = PageRequest { number, size };
        // OFFSET is a bigint on the server
        if i64::try_from(request.offset()).is_err() {
            return Err(StoreError::Validation(format!(
                "page {} of size {} is out of range",
                number, size
            )));
        }
        Ok(request)
    }

    /// Fill missing parameters with the defaults (page 0, 100 items).
    pub fn or_default(number: Option<u32>, size: Option<u32>) -> Result<Self, StoreError> {
        Self::new(
            number.unwrap_or(DEFAULT_PAGE_NUMBER),
            size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            number: DEFAULT_PAGE_NUMBER,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// `ceil(total / size)`; zero rows make zero pages.
pub fn total_pages(total_count: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_count.div_ceil(u64::from(page_size))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<V> {
    pub items: Vec<V>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u64,
}

impl<V> Page<V> {
    pub fn new(items: Vec<V>, request: PageRequest, total_count: u64) -> Self {
        Page {
            items,
            page_number: request.number,
            page_size: request.size,
            total_count,
            total_pages: total_pages(total_count, request.size),
        }
    }

    pub fn map<U>(self, f: impl FnMut(V) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

impl Direction {
    pub fn is_descending(&self) -> bool {
        matches!(self, Direction::Descending)
    }

    fn sql(&self) -> &'static str {
        match self {
            Direction::Ascending => "ASC",
            Direction::Descending => "DESC",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascending" | "asc" => Ok(Direction::Ascending),
            "descending" | "desc" => Ok(Direction::Descending),
            _ => Err(StoreError::Validation(format!(
                "invalid direction: {} (expected ASCENDING or DESCENDING)",
                s
            ))),
        }
    }
}

/// Sort fields (by field name) with one direction applied to all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    pub fields: Vec<String>,
    pub direction: Direction,
}

impl Sort {
    pub fn unsorted() -> Self {
        Sort::default()
    }

    pub fn by<I, S>(fields: I, direction: Direction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Sort {
            fields: fields.into_iter().map(Into::into).collect(),
            direction,
        }
    }

    pub fn is_unsorted(&self) -> bool {
        self.fields.is_empty()
    }

    /// `ORDER BY` clause body (without the keywords) over the sort fields' columns, or `None`
    /// when there is nothing to sort by. Unknown field names fail.
    pub fn order_by(&self, fields: &[Field]) -> Result<Option<String>, StoreError> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        let direction = self.direction.sql();
        let parts = self
            .fields
            .iter()
            .map(|name| {
                fields
                    .iter()
                    .find(|f| f.name == *name)
                    .map(|f| format!("{} {}", crate::sql::quoted(&f.column.name), direction))
                    .ok_or_else(|| StoreError::Validation(format!("unknown sort field: {}", name)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(parts.join(", ")))
    }
}
