//! M3U8 manifest rewriter (C6).
//!
//! Grounded on `m3u8.RangeM3u8SegmentsWithBaseUrl`/`ReplaceM3u8SegmentsWithBaseUrl`
//! as used from `synctv`'s `server/handlers/proxy/m3u8.go`. This is a
//! line-based textual tokenizer, not a typed round-trip parser like the
//! `m3u8-rs` crate: every non-URI byte of the playlist must be preserved
//! exactly, which a parse-then-reserialize model cannot guarantee.

use url::Url;

use crate::errors::{AppError, AppResult};

/// One piece of a tokenized playlist: either framing bytes to copy verbatim,
/// or a segment/resource URI (as it appeared in the source text, not yet
/// resolved against the base).
#[derive(Debug, PartialEq, Eq)]
enum Token {
    Literal(String),
    Uri(String),
}

const URI_ATTR_TAGS: [&str; 3] = ["#EXT-X-MEDIA:", "#EXT-X-MAP:", "#EXT-X-KEY:"];

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        let line = &rest[..line_end];
        rest = &rest[line_end..];

        let (content, ending) = match line.strip_suffix("\r\n") {
            Some(c) => (c, "\r\n"),
            None => match line.strip_suffix('\n') {
                Some(c) => (c, "\n"),
                None => (line, ""),
            },
        };

        let trimmed = content.trim();

        if trimmed.is_empty() {
            tokens.push(Token::Literal(line.to_string()));
            continue;
        }

        if let Some(span) = uri_attr_span(content) {
            let (start, end) = span;
            tokens.push(Token::Literal(content[..start].to_string()));
            tokens.push(Token::Uri(content[start..end].to_string()));
            tokens.push(Token::Literal(content[end..].to_string()));
            tokens.push(Token::Literal(ending.to_string()));
            continue;
        }

        if trimmed.starts_with('#') {
            tokens.push(Token::Literal(line.to_string()));
            continue;
        }

        // A bare segment/playlist reference line.
        let start = content.find(trimmed).unwrap_or(0);
        let end = start + trimmed.len();
        tokens.push(Token::Literal(content[..start].to_string()));
        tokens.push(Token::Uri(trimmed.to_string()));
        tokens.push(Token::Literal(content[end..].to_string()));
        tokens.push(Token::Literal(ending.to_string()));
    }

    tokens
}

/// Find the byte span of the `URI="..."` attribute value on a directive
/// line, for the three directives whose media reference is an inline
/// attribute rather than a following line (`EXT-X-STREAM-INF`'s URI is on
/// the *next* line, which the generic bare-reference branch above already
/// handles).
fn uri_attr_span(line: &str) -> Option<(usize, usize)> {
    if !URI_ATTR_TAGS.iter().any(|tag| line.starts_with(tag)) {
        return None;
    }
    let key = "URI=\"";
    let key_pos = line.find(key)?;
    let value_start = key_pos + key.len();
    let value_end = value_start + line[value_start..].find('"')?;
    Some((value_start, value_end))
}

/// Iterate every segment URI in `text`, resolved absolute against `base`.
/// `visitor` returns `Ok(false)` to stop early.
pub fn range_segments(
    text: &str,
    base: &Url,
    mut visitor: impl FnMut(&str) -> AppResult<bool>,
) -> AppResult<()> {
    for token in tokenize(text) {
        if let Token::Uri(raw) = token {
            let resolved = resolve(base, &raw)?;
            if !visitor(resolved.as_str())? {
                break;
            }
        }
    }
    Ok(())
}

/// Rewrite every segment URI in `text` via `mapper(resolved_absolute_url)`,
/// preserving all non-URI bytes exactly.
pub fn replace_segments(
    text: &str,
    base: &Url,
    mut mapper: impl FnMut(&str) -> AppResult<String>,
) -> AppResult<String> {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Literal(s) => out.push_str(&s),
            Token::Uri(raw) => {
                let resolved = resolve(base, &raw)?;
                out.push_str(&mapper(resolved.as_str())?);
            }
        }
    }
    Ok(out)
}

fn resolve(base: &Url, raw: &str) -> AppResult<Url> {
    base.join(raw)
        .map_err(|e| AppError::bad_request(format!("invalid segment URI '{raw}': {e}")))
}

/// True iff `url`'s path extension indicates a nested playlist
/// (`.m3u8`/`.m3u`) rather than a media segment.
pub fn is_playlist_url(url: &str) -> bool {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let path = path.to_lowercase();
    path.ends_with(".m3u8") || path.ends_with(".m3u")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://h/a/b.m3u8").unwrap()
    }

    #[test]
    fn resolves_and_visits_bare_segment_lines() {
        let text = "#EXTM3U\n#EXTINF:10,\nseg1.ts\nseg2.ts\n";
        let mut seen = Vec::new();
        range_segments(text, &base(), |uri| {
            seen.push(uri.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec!["https://h/a/seg1.ts", "https://h/a/seg2.ts"]);
    }

    #[test]
    fn replace_preserves_non_uri_bytes_exactly() {
        let text = "#EXTM3U\n#EXTINF:10,\nseg1.ts\nseg2.ts\n";
        let rewritten = replace_segments(text, &base(), |uri| Ok(format!("/proxy?u={uri}"))).unwrap();
        assert_eq!(
            rewritten,
            "#EXTM3U\n#EXTINF:10,\n/proxy?u=https://h/a/seg1.ts\n/proxy?u=https://h/a/seg2.ts\n"
        );
    }

    #[test]
    fn rewrites_ext_x_media_uri_attribute_in_place() {
        let text = "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"audio.m3u8\"\n";
        let rewritten = replace_segments(text, &base(), |uri| Ok(format!("TOKEN({uri})"))).unwrap();
        assert_eq!(
            rewritten,
            "#EXTM3U\n#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",URI=\"TOKEN(https://h/a/audio.m3u8)\"\n"
        );
    }

    #[test]
    fn rewrites_ext_x_key_uri_attribute() {
        let text = "#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x1\n";
        let rewritten = replace_segments(text, &base(), |uri| Ok(format!("T({uri})"))).unwrap();
        assert_eq!(rewritten, "#EXT-X-KEY:METHOD=AES-128,URI=\"T(https://h/a/key.bin)\",IV=0x1\n");
    }

    #[test]
    fn stream_inf_references_its_following_uri_line_not_itself() {
        let text = "#EXT-X-STREAM-INF:BANDWIDTH=100\nvariant.m3u8\n";
        let mut seen = Vec::new();
        range_segments(text, &base(), |uri| {
            seen.push(uri.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec!["https://h/a/variant.m3u8"]);
    }

    #[test]
    fn visitor_can_stop_early() {
        let text = "seg1.ts\nseg2.ts\nseg3.ts\n";
        let mut seen = Vec::new();
        range_segments(text, &base(), |uri| {
            seen.push(uri.to_string());
            Ok(seen.len() < 1)
        })
        .unwrap();
        assert_eq!(seen, vec!["https://h/a/seg1.ts"]);
    }

    #[test]
    fn detects_nested_playlist_extension() {
        assert!(is_playlist_url("https://h/a/variant.m3u8"));
        assert!(is_playlist_url("https://h/a/variant.m3u"));
        assert!(!is_playlist_url("https://h/a/seg1.ts"));
    }

    #[test]
    fn comment_only_lines_are_untouched() {
        let text = "#EXTM3U\n#EXT-X-VERSION:3\n";
        let rewritten = replace_segments(text, &base(), |_| Ok("X".to_string())).unwrap();
        assert_eq!(rewritten, text);
    }
}
