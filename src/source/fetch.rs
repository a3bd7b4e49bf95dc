//! Remote source transport.

use anyhow::{Context, Result};
use std::io::Read;
use url::Url;

/// A fetched remote payload.
pub struct FetchedSource {
    /// Size announced by the server, if any.
    pub content_length: Option<u64>,
    pub body: Box<dyn Read>,
}

/// Fetches remote sources. One request at a time, in source order.
pub trait Fetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedSource>;
}

/// Plain HTTP(S) fetcher.
///
/// No request timeout: a slow mirror stalls the bundle rather than failing it.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(None)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &Url) -> Result<FetchedSource> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("fetching '{url}'"))?
            .error_for_status()
            .with_context(|| format!("fetching '{url}'"))?;
        Ok(FetchedSource {
            content_length: response.content_length(),
            body: Box::new(response),
        })
    }
}
