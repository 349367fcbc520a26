//! Offset/limit pagination primitives shared by repositories and envelopes.
//!
//! A [`PageRequest`] validates a 1-based page number and a page size, derives
//! the row offset, and combines with a total row count into a [`PageInfo`].
//! The navigation fields of a [`PageInfo`] are always derived from the same
//! three numbers, so they can never disagree with one another:
//!
//! - `offset = (page - 1) * limit`
//! - `total_pages = ceil(total / limit)`
//! - `has_next = page < total_pages`
//! - `has_prev = page > 1`
//!
//! # Examples
//!
//! ```
//! use pagination::PageRequest;
//!
//! let request = PageRequest::new(2, 10)?;
//! assert_eq!(request.offset(), 10);
//!
//! let info = request.info(25);
//! assert_eq!(info.total_pages, 3);
//! assert!(info.has_next);
//! assert!(info.has_prev);
//! # Ok::<(), pagination::PageRequestError>(())
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a page request is out of range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageRequestError {
    /// Page numbers start at one.
    #[error("page must be at least 1, got {page}")]
    PageOutOfRange {
        /// Rejected page number.
        page: u64,
    },
    /// Page sizes must be positive.
    #[error("limit must be at least 1, got {limit}")]
    LimitOutOfRange {
        /// Rejected page size.
        limit: u64,
    },
    /// Page size exceeds the configured ceiling.
    #[error("limit must not exceed {max}, got {limit}")]
    LimitTooLarge {
        /// Rejected page size.
        limit: u64,
        /// Largest accepted page size.
        max: u64,
    },
    /// The row offset cannot be represented.
    #[error("page {page} with limit {limit} overflows the row offset")]
    OffsetOverflow {
        /// Requested page number.
        page: u64,
        /// Requested page size.
        limit: u64,
    },
}

/// Validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPageRequest", into = "RawPageRequest")]
pub struct PageRequest {
    page: u64,
    limit: u64,
    offset: u64,
}

impl PageRequest {
    /// Page size used when a caller does not supply one.
    pub const DEFAULT_LIMIT: u64 = 20;

    /// Validate a page number and page size.
    ///
    /// # Errors
    ///
    /// Returns [`PageRequestError`] when `page` or `limit` is zero, or when
    /// the derived offset overflows `u64`.
    pub const fn new(page: u64, limit: u64) -> Result<Self, PageRequestError> {
        if page < 1 {
            return Err(PageRequestError::PageOutOfRange { page });
        }
        if limit < 1 {
            return Err(PageRequestError::LimitOutOfRange { limit });
        }
        match (page - 1).checked_mul(limit) {
            Some(offset) => Ok(Self {
                page,
                limit,
                offset,
            }),
            None => Err(PageRequestError::OffsetOverflow { page, limit }),
        }
    }

    /// Validate a page request and additionally cap the page size.
    ///
    /// # Errors
    ///
    /// Returns [`PageRequestError::LimitTooLarge`] when `limit > max`, and
    /// otherwise the same errors as [`PageRequest::new`].
    pub const fn bounded(page: u64, limit: u64, max: u64) -> Result<Self, PageRequestError> {
        if limit > max {
            return Err(PageRequestError::LimitTooLarge { limit, max });
        }
        Self::new(page, limit)
    }

    /// First page with the default page size.
    #[must_use]
    pub const fn first() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u64 {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Number of rows skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Describe this page against a total row count.
    #[must_use]
    pub const fn info(&self, total: u64) -> PageInfo {
        let total_pages = total.div_ceil(self.limit);
        PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            total_pages,
            has_next: self.page < total_pages,
            has_prev: self.page > 1,
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

#[derive(Serialize, Deserialize)]
struct RawPageRequest {
    page: u64,
    limit: u64,
}

impl TryFrom<RawPageRequest> for PageRequest {
    type Error = PageRequestError;

    fn try_from(value: RawPageRequest) -> Result<Self, Self::Error> {
        Self::new(value.page, value.limit)
    }
}

impl From<PageRequest> for RawPageRequest {
    fn from(value: PageRequest) -> Self {
        Self {
            page: value.page,
            limit: value.limit,
        }
    }
}

/// Navigation metadata describing one page of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// 1-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Total matching rows across all pages.
    pub total: u64,
    /// `ceil(total / limit)`.
    pub total_pages: u64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
}

/// One page of results paired with its navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    /// Rows on this page, at most `pagination.limit` of them.
    pub data: Vec<T>,
    /// Navigation metadata.
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    /// Pair a page of rows with the request that produced it.
    #[must_use]
    pub const fn new(data: Vec<T>, request: &PageRequest, total: u64) -> Self {
        Self {
            data,
            pagination: request.info(total),
        }
    }

    /// Transform every row while keeping the navigation metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }

    /// Fallibly transform every row, keeping the navigation metadata.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Paginated<U>, E> {
        Ok(Paginated {
            data: self.data.into_iter().map(f).collect::<Result<_, _>>()?,
            pagination: self.pagination,
        })
    }
}
