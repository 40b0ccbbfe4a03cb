//! Opaque page cursors and pool sizing
//!
//! A walk is served in pool segments. Each segment holds the semantic
//! candidates ranked `pool_start..pool_end`; pages slice a segment after
//! fusion. Everything in earlier segments has already been served, so a
//! segment never repeats them and fusion reorders only within a segment.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{Result, TeamSearchError};

const CURSOR_PREFIX: &str = "tsc2:";

/// Position of a page within a cursor walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Zero-based page within the current segment
    pub page: usize,
    /// Candidates already served by earlier segments
    pub pool_start: usize,
    /// Candidates retrieved for the current segment
    pub pool_end: usize,
}

impl PageCursor {
    /// First page of a walk
    pub fn first(pool_end: usize) -> Self {
        Self {
            page: 0,
            pool_start: 0,
            pool_end,
        }
    }

    /// Next page of the same segment
    pub fn next_page(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }

    /// First page of the segment following this one
    pub fn next_segment(self, pool_end: usize) -> Self {
        Self {
            page: 0,
            pool_start: self.pool_end,
            pool_end,
        }
    }
}

/// Encode a page position as an opaque cursor
pub fn encode_cursor(cursor: PageCursor) -> String {
    URL_SAFE_NO_PAD.encode(format!(
        "{CURSOR_PREFIX}{}:{}:{}",
        cursor.page, cursor.pool_start, cursor.pool_end
    ))
}

/// Decode a cursor produced by [`encode_cursor`]
pub fn decode_cursor(cursor: &str) -> Result<PageCursor> {
    let invalid = || TeamSearchError::InvalidCursor(cursor.to_string());

    let bytes = URL_SAFE_NO_PAD.decode(cursor.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    let body = text.strip_prefix(CURSOR_PREFIX).ok_or_else(invalid)?;

    let fields: Vec<usize> = body
        .split(':')
        .map(|field| field.parse().map_err(|_| invalid()))
        .collect::<Result<_>>()?;

    match fields.as_slice() {
        &[page, pool_start, pool_end] if pool_start < pool_end => Ok(PageCursor {
            page,
            pool_start,
            pool_end,
        }),
        _ => Err(invalid()),
    }
}

/// How the candidate pool grows along a walk
#[derive(Debug, Clone, Copy)]
pub struct PoolSizing {
    pub multiplier: usize,
    pub cap: usize,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            multiplier: 3,
            cap: 1000,
        }
    }
}

/// Candidates to retrieve for zero-based `page`: shallow pages are exact, deep
/// pages best-effort
pub fn pool_size(page: usize, limit: usize, sizing: PoolSizing) -> usize {
    (page.saturating_add(1))
        .saturating_mul(limit)
        .saturating_mul(sizing.multiplier)
        .min(sizing.cap)
}

/// One slice of an ordered pool
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the pool holds items past this page
    pub has_more: bool,
}

/// Slice page `page` of `limit` items out of `pool`
pub fn paginate<T>(pool: Vec<T>, page: usize, limit: usize) -> Page<T> {
    let start = page.saturating_mul(limit);
    if limit == 0 || start >= pool.len() {
        return Page {
            items: Vec::new(),
            has_more: false,
        };
    }

    let end = start.saturating_add(limit).min(pool.len());
    let has_more = end < pool.len();
    let items = pool.into_iter().skip(start).take(end - start).collect();

    Page { items, has_more }
}
