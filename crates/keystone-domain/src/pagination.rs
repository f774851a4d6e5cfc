//! Pagination, sort direction and the page envelope returned by list queries.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound applied to requested page sizes.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Generic sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sort {
    Asc,
    Desc,
}

impl FromStr for Sort {
    type Err = PageError;

    /// Accepts `asc`/`desc` in any letter case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(PageError::InvalidDirection(s.to_owned()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page size must be at least 1")]
    EmptyPageSize,
    #[error("invalid sort direction: {0}")]
    InvalidDirection(String),
}

/// Pagination parameters shared across all list operations.
///
/// - `page`: 0-based index, default 0
/// - `size`: 1–100, default 20
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_size() -> u32 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: default_size(),
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Reject a zero page size and cap the size at [`MAX_PAGE_SIZE`].
    pub fn validated(self) -> Result<Self, PageError> {
        if self.size == 0 {
            return Err(PageError::EmptyPageSize);
        }
        Ok(Self {
            page: self.page,
            size: self.size.min(MAX_PAGE_SIZE),
        })
    }

    /// Number of records preceding this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

/// One page of results plus the metadata envelope.
///
/// The metadata is derived from the request and the total count only, so it
/// does not depend on which filters produced the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub number_of_elements: u32,
    pub first: bool,
    pub last: bool,
    pub empty: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let total_pages = if request.size == 0 {
            0
        } else {
            total_elements.div_ceil(u64::from(request.size)) as u32
        };
        let number_of_elements = content.len() as u32;
        Self {
            empty: content.is_empty(),
            content,
            number: request.page,
            size: request.size,
            total_elements,
            total_pages,
            number_of_elements,
            first: request.page == 0,
            last: request.page.saturating_add(1) >= total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            number_of_elements: self.number_of_elements,
            first: self.first,
            last: self.last,
            empty: self.empty,
        }
    }
}
