//! SliceCacheProxy (C5): the HTTP handler core that services byte ranges
//! from the slice cache over the remote source adapter (C2), the keyed
//! mutex (C3), and the slice cache (C4).
//!
//! Grounded on `SliceCacheProxy`/`Proxy`/`setResponseHeaders`/`writeResponse`
//! in `synctv`'s `server/handlers/proxy/slice.go`, reworked from a
//! `http.ResponseWriter`-style imperative write into a lazily-evaluated
//! `axum::body::Body` stream so a failure partway through still delivers
//! whatever slices were already fetched before the connection is truncated —
//! HTTP headers already sent to the client can't be unwound.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode, header};
use bytes::Bytes;
use futures::stream;

use crate::errors::{AppError, AppResult};
use crate::proxy::byte_range::ByteRange;
use crate::proxy::cache::{CacheItem, CacheMetadata, SliceCache, slice_key};
use crate::proxy::source::HttpSource;

/// The four headers C5 sets itself; any same-named header on the cached
/// metadata is dropped rather than forwarded, since these four must reflect
/// the range actually being served rather than whatever the origin sent.
const AUTHORITATIVE_HEADERS: [&str; 4] = [
    "content-type",
    "content-length",
    "content-range",
    "accept-ranges",
];

pub struct SliceCacheProxy {
    key: String,
    slice_size: u64,
    source: HttpSource,
    cache: Arc<dyn SliceCache>,
    locks: Arc<crate::proxy::keyed_mutex::KeyedMutex>,
}

impl SliceCacheProxy {
    pub fn new(
        key: String,
        slice_size: u64,
        source: HttpSource,
        cache: Arc<dyn SliceCache>,
        locks: Arc<crate::proxy::keyed_mutex::KeyedMutex>,
    ) -> Self {
        Self {
            key,
            slice_size,
            source,
            cache,
            locks,
        }
    }

    fn aligned_offset(&self, offset: i64) -> i64 {
        (offset / self.slice_size as i64) * self.slice_size as i64
    }

    async fn get_cache_item(&mut self, aligned_offset: i64) -> AppResult<CacheItem> {
        if aligned_offset < 0 {
            return Err(AppError::internal(format!(
                "cache item offset cannot be negative, got: {aligned_offset}"
            )));
        }

        let key = slice_key(&self.key, aligned_offset, self.slice_size);
        let _guard = self.locks.lock(&key).await;

        if let Some(item) = self.cache.get(&key).await? {
            tracing::debug!(resource = %self.key, aligned_offset, "slice cache hit");
            return Ok(item);
        }

        tracing::debug!(resource = %self.key, aligned_offset, "slice cache miss, fetching upstream");
        let item = self.fetch_from_source(aligned_offset).await?;
        self.cache.set(&key, item.clone()).await?;
        Ok(item)
    }

    async fn fetch_from_source(&mut self, offset: i64) -> AppResult<CacheItem> {
        if offset < 0 {
            return Err(AppError::internal(format!(
                "source offset cannot be negative, got: {offset}"
            )));
        }
        self.source.seek(offset).await?;
        let data = self.source.read(self.slice_size as usize).await?;

        let mut headers = std::collections::HashMap::new();
        for (name, value) in self.source.headers().iter() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.to_string())
                    .or_insert_with(Vec::new)
                    .push(value.to_string());
            }
        }

        Ok(CacheItem {
            metadata: CacheMetadata {
                headers,
                content_total_length: self.source.content_total_length(),
                content_type: self.source.content_type().to_string(),
            },
            data,
        })
    }

    /// Serve a request for `range_header` (the raw `Range` header value, or
    /// `""` if absent). Consumes `self`: the source adapter is
    /// non-reentrant and is driven by the lazily-evaluated body stream for
    /// the remainder of the response.
    pub async fn serve(mut self, range_header: &str) -> AppResult<Response<Body>> {
        let range = ByteRange::parse(range_header)?;
        let aligned = self.aligned_offset(range.start);
        let first_item = self.get_cache_item(aligned).await?;

        let total = first_item.metadata.content_total_length;
        let remaining = range.content_length(total);
        let has_range = !range_header.is_empty();

        let mut response = Response::builder();
        for (name, values) in &first_item.metadata.headers {
            if AUTHORITATIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            let Ok(header_name) = HeaderName::try_from(name.as_str()) else {
                continue;
            };
            for value in values {
                if let Ok(header_value) = HeaderValue::from_str(value) {
                    response = response.header(header_name.clone(), header_value);
                }
            }
        }

        response = response.header(header::CONTENT_TYPE, &first_item.metadata.content_type);
        if remaining >= 0 {
            response = response.header(header::CONTENT_LENGTH, remaining.to_string());
        }

        let status = if has_range {
            response = response
                .header(header::ACCEPT_RANGES, "bytes")
                .header(header::CONTENT_RANGE, range.content_range_header(total));
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };
        response = response.status(status);

        if remaining == 0 {
            return response
                .body(Body::empty())
                .map_err(AppError::from);
        }

        let slice_offset = range.start - aligned;
        if slice_offset < 0 {
            return Err(AppError::internal(format!(
                "slice offset cannot be negative, got: {slice_offset}"
            )));
        }

        let next_aligned = aligned + self.slice_size_i64();
        let state = StreamState {
            proxy: self,
            current: Some(first_item),
            item_offset: slice_offset as usize,
            next_aligned,
            remaining,
        };

        let body_stream = stream::unfold(state, next_chunk);
        response.body(Body::from_stream(body_stream)).map_err(AppError::from)
    }

    fn slice_size_i64(&self) -> i64 {
        self.slice_size as i64
    }
}

struct StreamState {
    proxy: SliceCacheProxy,
    current: Option<CacheItem>,
    item_offset: usize,
    next_aligned: i64,
    /// `-1` means "unbounded, stream until upstream EOF".
    remaining: i64,
}

async fn next_chunk(mut state: StreamState) -> Option<(Result<Bytes, std::io::Error>, StreamState)> {
    loop {
        if state.remaining == 0 {
            return None;
        }

        let Some(item) = state.current.as_ref() else {
            let fetched = state.proxy.get_cache_item(state.next_aligned).await;
            match fetched {
                Ok(item) => {
                    state.next_aligned += state.proxy.slice_size_i64();
                    state.current = Some(item);
                    state.item_offset = 0;
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "slice fetch failed mid-stream");
                    return Some((
                        Err(std::io::Error::other(e.to_string())),
                        StreamState {
                            remaining: 0,
                            ..state
                        },
                    ));
                }
            }
        };

        if state.item_offset >= item.data.len() {
            let was_last = (item.data.len() as u64) < state.proxy.slice_size;
            if was_last {
                return None;
            }
            state.current = None;
            continue;
        }

        let available = item.data.len() - state.item_offset;
        let take = if state.remaining >= 0 {
            available.min(state.remaining as usize)
        } else {
            available
        };
        if take == 0 {
            return None;
        }

        let chunk = item.data.slice(state.item_offset..state.item_offset + take);
        state.item_offset += take;
        if state.remaining >= 0 {
            state.remaining -= take as i64;
        }

        return Some((Ok(chunk), state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::cache::InMemorySliceCache;
    use crate::proxy::keyed_mutex::KeyedMutex;
    use std::collections::HashMap;

    fn item_with(bytes: &[u8], total: i64) -> CacheItem {
        CacheItem {
            metadata: CacheMetadata {
                headers: HashMap::new(),
                content_total_length: total,
                content_type: "video/mp2t".to_string(),
            },
            data: Bytes::copy_from_slice(bytes),
        }
    }

    #[tokio::test]
    async fn stream_state_drains_single_full_slice_to_completion() {
        let cache: Arc<dyn SliceCache> = Arc::new(InMemorySliceCache::new(8));
        let locks = Arc::new(KeyedMutex::new());
        let client = crate::proxy::source::build_client(std::time::Duration::from_secs(1)).unwrap();
        let source = HttpSource::new(client, url::Url::parse("http://example/x").unwrap(), Default::default());
        let proxy = SliceCacheProxy::new("movie-1".into(), 64, source, cache, locks);

        let state = StreamState {
            proxy,
            current: Some(item_with(b"hello world", 11)),
            item_offset: 0,
            next_aligned: 64,
            remaining: 11,
        };

        let mut collected = Vec::new();
        let mut state = Some(state);
        while let Some(s) = state.take() {
            match next_chunk(s).await {
                Some((chunk, next)) => {
                    collected.push(chunk.unwrap());
                    state = Some(next);
                }
                None => break,
            }
        }

        let body: Vec<u8> = collected.into_iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(body, b"hello world");
    }
}
