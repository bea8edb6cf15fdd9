//! HTTP `Range` header parsing (C1).
//!
//! Grounded on the original `ParseByteRange` in `synctv`'s
//! `server/handlers/proxy/slice.go`, adapted to return an [`AppError`] instead
//! of a bare error, and to explicitly reject suffix ranges (`bytes=-N`)
//! rather than silently falling through to a wrong interpretation, since a
//! missing left side combined with an ambiguous right side has no single
//! correct meaning under RFC 7233.

use crate::errors::{AppError, AppResult};

/// A parsed `Range: bytes=...` request. `end == -1` denotes "through end of
/// resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: i64,
    pub end: i64,
}

impl ByteRange {
    /// The range meaning "everything", as produced by an absent header.
    pub const FULL: Self = Self { start: 0, end: -1 };

    /// Parse a `Range` header value. An empty string (header absent) yields
    /// [`ByteRange::FULL`].
    pub fn parse(range: &str) -> AppResult<Self> {
        if range.is_empty() {
            return Ok(Self::FULL);
        }

        let rest = range.strip_prefix("bytes=").ok_or_else(|| {
            AppError::bad_request(format!(
                "range header must start with 'bytes=', got: {range}"
            ))
        })?;

        let mut parts = rest.splitn(3, '-');
        let left = parts.next().unwrap_or("");
        let right = match parts.next() {
            Some(r) => r,
            None => {
                return Err(AppError::bad_request(format!(
                    "range header must contain exactly one hyphen (-) separator, got: {rest}"
                )));
            }
        };
        if parts.next().is_some() {
            return Err(AppError::bad_request(format!(
                "range header must contain exactly one hyphen (-) separator, got: {rest}"
            )));
        }

        let left = left.trim();
        let right = right.trim();

        if left.is_empty() && right.is_empty() {
            return Err(AppError::bad_request(format!(
                "range header cannot have empty start and end values: {rest}"
            )));
        }

        if left.is_empty() {
            // Suffix range `bytes=-N`: explicitly rejected rather than
            // silently treated as `start=0, end=N`.
            return Err(AppError::bad_request(
                "suffix ranges (bytes=-N) are not supported",
            ));
        }

        let start: i64 = left
            .parse()
            .map_err(|_| AppError::bad_request(format!("failed to parse range start value '{left}'")))?;
        if start < 0 {
            return Err(AppError::bad_request(format!(
                "range start value must be non-negative, got: {start}"
            )));
        }

        if right.is_empty() {
            return Ok(Self { start, end: -1 });
        }

        let end: i64 = right
            .parse()
            .map_err(|_| AppError::bad_request(format!("failed to parse range end value '{right}'")))?;
        if end < 0 {
            return Err(AppError::bad_request(format!(
                "range end value must be non-negative, got: {end}"
            )));
        }
        if start > end {
            return Err(AppError::bad_request(format!(
                "range start value ({start}) cannot be greater than end value ({end})"
            )));
        }

        Ok(Self { start, end })
    }

    /// The `Content-Length` for this range against a resource of the given
    /// total length (`-1` if unknown). Returns `-1` when the length itself
    /// is unknown (unbounded range over an unbounded resource).
    pub fn content_length(&self, total: i64) -> i64 {
        compute_length(self.start, self.end, total)
    }

    /// Format the `Content-Range` response header value.
    pub fn content_range_header(&self, total: i64) -> String {
        let total_str = if total >= 0 {
            total.to_string()
        } else {
            "*".to_string()
        };
        let end = if self.end == -1 && total >= 0 {
            total - 1
        } else {
            self.end
        };
        format!("bytes {}-{}/{}", self.start, end, total_str)
    }
}

/// Compute the `Content-Length` a range response should carry, given the
/// request's `start`/`end` and the resource's `total` length (`-1` if
/// unknown). Returns `-1` when the length itself is unknown.
pub fn compute_length(start: i64, end: i64, total: i64) -> i64 {
    if total == -1 && end == -1 {
        return -1;
    }
    if end == -1 {
        return total - start;
    }
    if total != -1 && end >= total {
        return total - start;
    }
    end - start + 1
}
