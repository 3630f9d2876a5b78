//! Common API utilities and shared types
//!
//! Pagination query parsing and the paged response envelope used by every
//! listing endpoint.

use serde::{Deserialize, Serialize};

use crate::models::{ListParams, PagedResult};

// ============================================================================
// Pagination Defaults
// ============================================================================

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size
pub fn default_page_size() -> u32 {
    10
}

// ============================================================================
// Pagination Query Types
// ============================================================================

/// `?page=&size=` (or `limit`) query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size", alias = "limit")]
    pub size: u32,
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            size: default_page_size(),
        }
    }
}

impl PaginationQuery {
    /// Clamped list parameters
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.size)
    }
}

// ============================================================================
// Paged Response
// ============================================================================

/// Paged response envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> From<PagedResult<T>> for PagedResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        Self {
            page: result.page,
            limit: result.per_page,
            total: result.total,
            total_pages: result.total_pages(),
            has_next: result.has_next(),
            has_prev: result.has_prev(),
            data: result.items,
        }
    }
}

/// Empty-string query values mean "not set"
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
