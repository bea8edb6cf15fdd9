//! Target token mint/verify (C7).
//!
//! A short HS256-signed envelope binding `(roomId, movieId, targetUrl,
//! isPlaylist)`, grounded on `m3u8TargetClaims`/`NewM3u8TargetToken`/
//! `GetM3u8Target` in `synctv`'s `server/handlers/proxy/m3u8.go`. Unlike the
//! source, which never expires a minted token, this implementation sets
//! `exp = nbf + 6h` by default to bound the impact of a leaked token.

use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;

/// Default token lifetime when minting a target token.
pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// The signed envelope carried by a proxy URL, serialized with short JSON
/// field names (`r`, `m`, `t`, `f`, `nbf`, `exp`) to keep minted URLs short.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetClaims {
    #[serde(rename = "r")]
    pub room_id: String,
    #[serde(rename = "m")]
    pub movie_id: String,
    #[serde(rename = "t")]
    pub target_url: String,
    #[serde(rename = "f")]
    pub is_playlist: bool,
    pub nbf: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Mints and verifies [`TargetClaims`] under a process-wide HS256 secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Mint a signed token for `(room_id, movie_id, target_url, is_playlist)`.
    pub fn mint(
        &self,
        room_id: &str,
        movie_id: &str,
        target_url: &str,
        is_playlist: bool,
    ) -> AppResult<String> {
        let now = unix_now();
        let claims = TargetClaims {
            room_id: room_id.to_string(),
            movie_id: movie_id.to_string(),
            target_url: target_url.to_string(),
            is_playlist,
            nbf: now,
            exp: Some(now + self.ttl.as_secs() as i64),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Verify a token, rejecting unsigned, expired, not-yet-valid, or
    /// wrong-algorithm tokens.
    pub fn verify(&self, token: &str) -> AppResult<TargetClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["nbf"]);
        validation.validate_nbf = true;
        let data = decode::<TargetClaims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

/// Seconds since the Unix epoch.
fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_under_same_secret() {
        let codec = TokenCodec::new("shared-secret");
        let token = codec.mint("room-1", "movie-1", "https://h/a.ts", false).unwrap();
        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.room_id, "room-1");
        assert_eq!(claims.movie_id, "movie-1");
        assert_eq!(claims.target_url, "https://h/a.ts");
        assert!(!claims.is_playlist);
    }

    #[test]
    fn verify_fails_under_different_secret() {
        let minted = TokenCodec::new("secret-a");
        let token = minted.mint("r", "m", "u", true).unwrap();
        let verifier = TokenCodec::new("secret-b");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let codec = TokenCodec::new("secret");
        assert!(codec.verify("not-a-jwt").is_err());
    }

    #[test]
    fn is_playlist_flag_round_trips() {
        let codec = TokenCodec::new("secret");
        let token = codec.mint("r", "m", "u", true).unwrap();
        assert!(codec.verify(&token).unwrap().is_playlist);
    }

    #[test]
    fn verify_rejects_not_yet_valid_token() {
        let codec = TokenCodec::new("secret");
        let future_claims = TargetClaims {
            room_id: "r".to_string(),
            movie_id: "m".to_string(),
            target_url: "u".to_string(),
            is_playlist: false,
            nbf: unix_now() + 3600,
            exp: None,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &future_claims,
            &codec.encoding_key,
        )
        .unwrap();
        assert!(codec.verify(&token).is_err());
    }
}
