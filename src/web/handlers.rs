//! The two HTTP handlers the core exposes (C5, C8), plus the `/health`
//! liveness endpoint (A4). Grounded on `GetM3u8Target`/`ProxyURL` in
//! `synctv`'s `server/handlers/proxy/m3u8.go` for the claim-verification and
//! rewrite flow, and on `slice.go`'s `SliceCacheProxy.ServeHTTP` for the
//! range-delegation path.

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::errors::{AppError, AppResult};
use crate::proxy::egress::check_egress;
use crate::proxy::m3u8;
use crate::proxy::slice_cache_proxy::SliceCacheProxy;
use crate::proxy::source::HttpSource;
use crate::proxy::token::TargetClaims;
use crate::proxy::{DEFAULT_USER_AGENT, ProxyCore};

/// `?token=...&roomId=...` query parameters carried by both routes.
///
/// `token` is the *outer* room/session token the surrounding application
/// would authenticate — that subsystem lives outside this core, so it only
/// round-trips the token into rewritten segment URLs without interpreting
/// it. `room_id` is compared against the signed claim so a target token
/// minted for one room can't be replayed against another.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    #[serde(default)]
    pub token: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/room/movie/proxy/{movie_id}/{target}` — C5 reached directly by
/// a signed target token, without going through the m3u8 rewrite pass.
pub async fn range_proxy_handler(
    State(core): State<ProxyCore>,
    Path((movie_id, target)): Path<(String, String)>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let claims = verify_claims(&core, &movie_id, &query.room_id, &target)?;
    let range_header = range_header_value(&headers);
    serve_range(&core, &claims, range_header).await
}

/// `GET /api/room/movie/proxy/{movie_id}/m3u8/{target}` — C8. Dispatches to
/// C5 for a non-playlist claim, otherwise fetches, parses, and rewrites the
/// playlist before returning it.
pub async fn m3u8_proxy_handler(
    State(core): State<ProxyCore>,
    Path((movie_id, target)): Path<(String, String)>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> AppResult<Response<Body>> {
    let claims = verify_claims(&core, &movie_id, &query.room_id, &target)?;

    if !claims.is_playlist {
        let range_header = range_header_value(&headers);
        return serve_range(&core, &claims, range_header).await;
    }

    let base = Url::parse(&claims.target_url)
        .map_err(|e| AppError::bad_request(format!("invalid target url: {e}")))?;
    let body = fetch_playlist(&core, &base).await?;

    // First pass: does any segment reference another playlist? Computed
    // across the whole document so every minted token carries the same
    // `is_playlist` flag, even for segments that aren't themselves nested
    // playlists.
    let mut has_nested_playlist = false;
    m3u8::range_segments(&body, &base, |uri| {
        if m3u8::is_playlist_url(uri) {
            has_nested_playlist = true;
        }
        Ok(true)
    })?;

    let rewritten = m3u8::replace_segments(&body, &base, |uri| {
        let segment_token = core.tokens.mint(&claims.room_id, &movie_id, uri, has_nested_playlist)?;
        Ok(self_url(&movie_id, &segment_token, &query.token, &claims.room_id))
    })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")
        .body(Body::from(rewritten))
        .map_err(AppError::from)
}

/// Verify `target`, and require its bound `roomId`/`movieId` match the path
/// it was presented on — the token binds nothing else, so this check is the
/// entirety of the authorization it provides.
fn verify_claims(
    core: &ProxyCore,
    movie_id: &str,
    room_id: &str,
    target: &str,
) -> AppResult<TargetClaims> {
    let claims = core.tokens.verify(target)?;
    if claims.movie_id != movie_id || claims.room_id != room_id {
        return Err(AppError::forbidden(
            "target token does not match the room/movie it was presented on",
        ));
    }
    Ok(claims)
}

async fn serve_range(
    core: &ProxyCore,
    claims: &TargetClaims,
    range_header: &str,
) -> AppResult<Response<Body>> {
    let url = Url::parse(&claims.target_url)
        .map_err(|e| AppError::bad_request(format!("invalid target url: {e}")))?;
    check_egress(&url, core.config.proxy.allow_proxy_to_local).await?;

    let source = HttpSource::new(core.http_client.clone(), url, HeaderMap::new());
    let proxy = SliceCacheProxy::new(
        claims.target_url.clone(),
        core.config.proxy.slice_size,
        source,
        core.cache.clone(),
        core.locks.clone(),
    );
    proxy.serve(range_header).await
}

/// Fetch a playlist into memory, capped at `max_m3u8_size` both by declared
/// `Content-Length` and by the body reader itself, since `Content-Length`
/// may be absent or lie about the body actually sent.
async fn fetch_playlist(core: &ProxyCore, url: &Url) -> AppResult<String> {
    check_egress(url, core.config.proxy.allow_proxy_to_local).await?;
    let max = core.config.proxy.max_m3u8_size;

    let response = core
        .http_client
        .get(url.clone())
        .header(header::USER_AGENT, DEFAULT_USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AppError::upstream(format!(
            "upstream returned {} for {url}",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max {
            return Err(AppError::bad_request(format!(
                "playlist declared length {len} exceeds max of {max} bytes"
            )));
        }
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        body.extend_from_slice(&chunk);
        if body.len() as u64 > max {
            return Err(AppError::bad_request(format!(
                "playlist body exceeded max size of {max} bytes"
            )));
        }
    }

    String::from_utf8(body).map_err(|e| AppError::bad_request(format!("playlist is not valid utf-8: {e}")))
}

fn range_header_value(headers: &HeaderMap) -> &str {
    headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

/// Build the self-URL a rewritten segment is replaced with, percent-encoding
/// the path and query components independently.
fn self_url(movie_id: &str, segment_token: &str, outer_token: &str, room_id: &str) -> String {
    format!(
        "/api/room/movie/proxy/{}/m3u8/{}?token={}&roomId={}",
        urlencoding::encode(movie_id),
        segment_token,
        urlencoding::encode(outer_token),
        urlencoding::encode(room_id),
    )
}
