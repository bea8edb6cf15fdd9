//! The media proxy core: C1–C9 from the component design, plus the shared
//! state that wires them together for the HTTP handlers in `crate::web`.

pub mod byte_range;
pub mod cache;
pub mod egress;
pub mod keyed_mutex;
pub mod m3u8;
pub mod slice_cache_proxy;
pub mod source;
pub mod token;

use std::sync::Arc;

use crate::config::Config;
use crate::proxy::cache::{InMemorySliceCache, SliceCache};
use crate::proxy::keyed_mutex::KeyedMutex;
use crate::proxy::token::TokenCodec;

/// Default outbound `User-Agent`, applied whenever the caller didn't supply
/// one of its own. Mirrors `utils.UA` in `synctv`'s `utils/proxy/proxy.go`
/// and the teacher's own convention of a fixed per-client default UA string
/// (`.user_agent("Xtream-Proxy/1.0")` in `src/sources/xtream.rs`).
pub const DEFAULT_USER_AGENT: &str = "media-proxy-core/1.0";

/// Shared, process-wide collaborators the two HTTP handlers (C5, C8) are
/// built from. Cheap to clone: everything inside is an `Arc` or `Copy`.
#[derive(Clone)]
pub struct ProxyCore {
    pub config: Arc<Config>,
    pub cache: Arc<dyn SliceCache>,
    pub locks: Arc<KeyedMutex>,
    pub tokens: TokenCodec,
    pub http_client: reqwest::Client,
}

impl ProxyCore {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = source::build_client(config.proxy.upstream_connect_timeout)?;
        let tokens = TokenCodec::new(&config.jwt.secret);
        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(InMemorySliceCache::new(4096)),
            locks: Arc::new(KeyedMutex::new()),
            tokens,
            http_client,
        })
    }
}
