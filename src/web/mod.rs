//! HTTP server bootstrap (A4): wires the C5/C8 handlers into an
//! `axum::Router`, mirroring `WebServer`/`create_router` in the teacher's
//! `web` module but reduced to the routes this core owns.

pub mod handlers;

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::proxy::ProxyCore;

/// An axum router bound to an address, ready to `serve`.
pub struct WebServer {
    router: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: Config) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        let core = ProxyCore::new(config)?;
        let router = Self::create_router(core);
        Ok(Self { router, addr })
    }

    /// Build the router directly from an already-assembled [`ProxyCore`].
    /// The seam integration tests use to drive handlers without binding a
    /// socket.
    pub fn router_for(core: ProxyCore) -> Router {
        Self::create_router(core)
    }

    fn create_router(core: ProxyCore) -> Router {
        Router::new()
            .route("/health", get(handlers::health_handler))
            .route(
                "/api/room/movie/proxy/{movie_id}/m3u8/{target}",
                get(handlers::m3u8_proxy_handler),
            )
            .route(
                "/api/room/movie/proxy/{movie_id}/{target}",
                get(handlers::range_proxy_handler),
            )
            .layer(CorsLayer::permissive())
            .with_state(core)
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %self.addr, "media proxy core listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
