//! Pagination types
//!
//! Offset pages for the report view and opaque keyset cursors for entity
//! lists.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use specdb_core::config::MAX_LIST_PAGE_SIZE;
use specdb_core::ValidationError;

/// Default items per page
const DEFAULT_PER_PAGE: u32 = 50;

/// Pagination parameters
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page
    pub per_page: u32,
}

impl Pagination {
    /// Create pagination with validation.
    ///
    /// - Page is clamped to minimum of 1
    /// - Per page is clamped to 1..=MAX_LIST_PAGE_SIZE
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_LIST_PAGE_SIZE),
        }
    }

    /// Calculate SQL OFFSET value.
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }

    /// Get LIMIT value.
    pub fn limit(&self) -> u32 {
        self.per_page
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// Items for current page
    pub items: Vec<T>,
    /// Total count across all pages
    pub total: i64,
    /// Current page number
    pub page: u32,
    /// Items per page
    pub per_page: u32,
}

impl<T> Paginated<T> {
    /// Calculate total number of pages.
    pub fn total_pages(&self) -> u32 {
        if self.total <= 0 {
            1
        } else {
            (self.total as u64).div_ceil(self.per_page as u64).max(1) as u32
        }
    }

    /// Check if there's a next page.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Check if there's a previous page.
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }
}

/// Query parameters for pagination
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaginationParams {
    /// Resolve against a configured default page size.
    pub fn resolve(&self, default_per_page: u32) -> Pagination {
        Pagination::new(
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(default_per_page),
        )
    }
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        params.resolve(DEFAULT_PER_PAGE)
    }
}

/// Position after the last row of a keyset page.
///
/// `key` is the keyset column value (blank for NULL) or `None` when the list
/// is ordered by primary key alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub key: Option<String>,
    pub id: i64,
}

impl Cursor {
    /// Opaque URL-safe token.
    pub fn encode(&self) -> String {
        // Serializing a struct of a string and an integer cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidFormat {
            field: "cursor",
            reason: "malformed page cursor".to_owned(),
        };
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| invalid())?;
        serde_json::from_slice(&bytes).map_err(|_| invalid())
    }
}

/// One page of a keyset-paginated list.
#[derive(Debug, Clone, Serialize)]
pub struct KeysetPage<T> {
    pub items: Vec<T>,
    /// Pass back as `after` to fetch the next page.
    pub next_cursor: Option<String>,
}
