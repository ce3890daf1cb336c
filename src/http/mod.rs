//! Minimal HTTP/1.x GET client with redirect chasing, Icy inline-metadata
//! stripping, and audio-playlist MIME unwrapping (spec.md §4.3, §6).
//!
//! Built on `reqwest::blocking` with automatic redirects disabled so the
//! engine performs and counts the redirect loop itself instead of letting
//! the HTTP client silently chase an unbounded chain.

mod icy;
mod playlist;
mod uri;

pub use icy::{IcyReader, MetadataState};
pub use uri::{is_url, ParsedUri};

use crate::config::PlayerConfig;
use crate::error::EngineError;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;

const PLAYLIST_MIME_TYPES: &[&str] = &["audio/m3u", "audio/x-scpls", "audio/x-mpegurl"];

/// A resolved HTTP response ready for the decoder: the body reader behind
/// it, its headers, and the effective Content-Type used to pick a plugin.
pub struct HttpAudioResponse {
    pub reader: Response,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub icy_meta_interval: Option<usize>,
    pub content_length: Option<u64>,
}

/// Builds a `reqwest::blocking::Client` with fixed connect/read timeouts
/// and no built-in redirect following — redirects are chased manually so
/// hops can be counted and the Icy/Basic-auth headers re-applied on every
/// hop.
pub fn build_client(config: &PlayerConfig) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(config.http_connect_timeout)
        .timeout(config.http_read_timeout)
        .redirect(Policy::none())
        .user_agent(concat!("spindle-engine/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Performs `GET uri`, following redirects up to `config.http_redirect_limit`
/// hops, unwrapping one level of audio-playlist response bodies, and
/// classifying the final response by Content-Type.
///
/// A 3xx response with a `Location` header recurses (counting hops); any
/// playlist MIME body is read and scanned for the first URI that itself
/// resolves successfully.
pub fn fetch(client: &Client, uri: &str, config: &PlayerConfig) -> Result<HttpAudioResponse, EngineError> {
    fetch_inner(client, uri, config, 0)
}

fn fetch_inner(
    client: &Client,
    uri: &str,
    config: &PlayerConfig,
    redirections: u32,
) -> Result<HttpAudioResponse, EngineError> {
    let parsed = uri::ParsedUri::parse(uri).ok_or_else(|| EngineError::InvalidUri(uri.to_string()))?;

    let mut builder = client.get(parsed.to_url().as_str());
    builder = builder.header("Icy-MetaData", "1");
    if let (Some(user), Some(pass)) = (&parsed.user, &parsed.pass) {
        let token = format!("{user}:{pass}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(token);
        builder = builder.header(AUTHORIZATION, format!("Basic {encoded}"));
    }

    let response = builder
        .send()
        .map_err(|e| EngineError::errno(uri, std::io::Error::new(std::io::ErrorKind::Other, e)))?;

    let status = response.status();

    if status.is_redirection() {
        if redirections >= config.http_redirect_limit {
            return Err(EngineError::HttpRedirectLimit(uri.to_string()));
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| EngineError::HttpResponse(uri.to_string()))?
            .to_string();
        return fetch_inner(client, &location, config, redirections + 1);
    }

    if status.as_u16() != 200 {
        return Err(EngineError::HttpStatus {
            context: uri.to_string(),
            code: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    let headers = response.headers().clone();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(';').next().unwrap_or(s).trim().to_lowercase());

    if let Some(ct) = &content_type {
        if PLAYLIST_MIME_TYPES.contains(&ct.as_str()) {
            return resolve_playlist(client, response, config, redirections);
        }
    }

    let icy_meta_interval = headers
        .get("icy-metaint")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    let content_length = response.content_length();

    Ok(HttpAudioResponse {
        reader: response,
        headers,
        content_type,
        icy_meta_interval,
        content_length,
    })
}

/// Reads a playlist response body, parses it as a flat list of URIs (one
/// per non-empty, non-comment line — the common denominator of M3U, PLS's
/// `FileN=`, and bare XSPF-less playlists this engine supports), and
/// recurses on the first URI that yields a decodable audio response.
fn resolve_playlist(
    client: &Client,
    response: Response,
    config: &PlayerConfig,
    redirections: u32,
) -> Result<HttpAudioResponse, EngineError> {
    let body = response
        .text()
        .map_err(|e| EngineError::HttpResponse(e.to_string()))?;

    for candidate in playlist::extract_uris(&body) {
        match fetch_inner(client, &candidate, config, redirections) {
            Ok(resp) => return Ok(resp),
            Err(_) => continue,
        }
    }

    Err(EngineError::HttpResponse("empty or unplayable playlist".to_string()))
}
