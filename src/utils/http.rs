use anyhow::{Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Default maximum body size for streaming downloads (20 MB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Build a `reqwest::Client` with standard timeouts (10 s connect, 30 s overall).
///
/// Falls back to the default client if the builder fails.
pub fn default_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Download a response body as bytes with a size limit.
///
/// Checks the `Content-Length` header first and rejects immediately if over
/// the limit; otherwise streams via `chunk()` with a running counter and
/// errors out once the limit is crossed. Attachments are relayed verbatim,
/// so a truncated body is never acceptable here.
pub async fn limited_body(resp: Response, max_bytes: usize) -> Result<Vec<u8>> {
    if let Some(cl) = resp.content_length()
        && cl as usize > max_bytes
    {
        bail!(
            "response body too large: Content-Length {} exceeds limit {}",
            cl,
            max_bytes
        );
    }

    let mut buf = Vec::new();
    let mut stream = resp;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            bail!("response body too large: exceeds limit {}", max_bytes);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
