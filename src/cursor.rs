//! Offset cursors shared by every listing call.
//!
//! A cursor is the decimal offset of the next page. The empty string means
//! "first page" on input and "no more pages" on output. Listings fetch one
//! row more than the page size to learn whether another page exists.

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};

/// Page size used when the caller asks for zero.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// A caller's paging request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub size: u32,
}

impl Pager {
    pub fn new(token: impl Into<String>, size: u32) -> Self {
        Self {
            token: token.into(),
            size,
        }
    }

    /// First page of `size` items.
    pub fn first(size: u32) -> Self {
        Self::new("", size)
    }

    /// Decodes the request into `(offset, limit)`.
    pub fn parse(&self) -> AccessResult<(i64, i64)> {
        let offset = if self.token.is_empty() {
            0
        } else {
            self.token
                .parse::<u64>()
                .ok()
                .and_then(|offset| i64::try_from(offset).ok())
                .ok_or_else(|| AccessError::InvalidCursor(self.token.clone()))?
        };

        let limit = if self.size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.size
        };

        Ok((offset, i64::from(limit)))
    }

    /// Pages through an already materialized list.
    pub fn apply<T>(&self, items: Vec<T>) -> AccessResult<Page<T>> {
        let (offset, limit) = self.parse()?;
        let rows = items
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize + 1)
            .collect();
        Ok(paginate(rows, offset, limit))
    }

    /// The request for the page after `cursor`, keeping this page size.
    pub fn next(&self, cursor: impl Into<String>) -> Self {
        Self::new(cursor, self.size)
    }
}

/// One page of results and the cursor of the following page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: String,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: impl Into<String>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.into(),
        }
    }

    /// A final page.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, "")
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_empty()
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Truncates `rows` (fetched with `limit + 1`) to one page.
pub fn paginate<T>(mut rows: Vec<T>, offset: i64, limit: i64) -> Page<T> {
    let limit_len = usize::try_from(limit).unwrap_or(0);
    if rows.len() > limit_len {
        rows.truncate(limit_len);
        return Page::new(rows, offset.saturating_add(limit).to_string());
    }
    Page::last(rows)
}
