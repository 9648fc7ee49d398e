//! Offset pagination utilities.

use serde::{Deserialize, Serialize};

/// A page request as received from a caller.
///
/// Both fields are optional; [`PageRequest::normalize`] fills in defaults
/// and clamps out-of-range values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A normalized page: 1-based page number and a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    /// Resolves defaults and clamps `per_page` to `1..=max_per_page`.
    pub fn normalize(&self, default_per_page: u32, max_per_page: u32) -> Page {
        let max_per_page = max_per_page.max(1);
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(default_per_page)
                .clamp(1, max_per_page),
        }
    }
}

impl Page {
    /// Page that returns every row up to `limit`.
    pub fn all(limit: u32) -> Self {
        Self {
            page: 1,
            per_page: limit.max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }
}

/// Pagination metadata returned alongside a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl PageInfo {
    pub fn new(page: Page, total: i64) -> Self {
        let per_page = i64::from(page.per_page);
        let total = total.max(0);
        Self {
            page: page.page,
            per_page: page.per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}
