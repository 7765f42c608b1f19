use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use crate::error::{Result, VdrvError};

/// Reads a remote archive through HTTP Range requests.
///
/// Only the byte ranges the parser asks for are fetched: the chain pointer,
/// each metadata record, and the compressed payload of every extracted file.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Send a HEAD request to `url` and prepare a reader for it.
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Self::with_client(client, url).await
    }

    /// Like [`new`](Self::new) but with a caller-configured client.
    ///
    /// Fails if the server does not advertise byte ranges or omits the
    /// content length.
    pub async fn with_client(client: Client, url: String) -> Result<Self> {
        let resp = client.head(&url).send().await?;
        if !resp.status().is_success() {
            return Err(VdrvError::Remote(format!("HEAD {url}: {}", resp.status())));
        }

        let headers = resp.headers();
        if !header_str(headers, ACCEPT_RANGES).contains("bytes") {
            return Err(VdrvError::Remote(format!("{url} does not serve byte ranges")));
        }
        let size = header_str(headers, CONTENT_LENGTH)
            .parse()
            .map_err(|_| VdrvError::Remote(format!("{url} sent no usable Content-Length")))?;

        debug!(url, size, "remote drive opened");
        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 10,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Fetch the inclusive range `first..=last`, retrying dropped connections.
    async fn fetch(&self, first: u64, last: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={first}-{last}");
        let mut attempt = 0;

        loop {
            let sent = self.client.get(&self.url).header(RANGE, &range).send().await;
            let err = match sent {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    return Ok(resp.bytes().await?.to_vec());
                }
                Ok(resp) => {
                    return Err(VdrvError::Remote(format!("{range}: {}", resp.status())));
                }
                Err(e) if e.is_timeout() || e.is_connect() => e,
                Err(e) => return Err(e.into()),
            };

            attempt += 1;
            if attempt >= self.max_retry {
                return Err(err.into());
            }
            warn!(attempt, max_retry = self.max_retry, "{range} failed: {err}");
            tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
        }
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let last = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let wanted = (last - offset + 1) as usize;
        let mut received = 0;

        while received < wanted {
            let chunk = self.fetch(offset + received as u64, last).await?;
            if chunk.is_empty() {
                // Server sent nothing for a range it claimed to have.
                break;
            }
            let n = chunk.len().min(wanted - received);
            buf[received..received + n].copy_from_slice(&chunk[..n]);
            received += n;
            self.transferred_bytes.fetch_add(n as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
