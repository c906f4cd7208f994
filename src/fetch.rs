//! CSV retrieval for the ratings and review documents.
//!
//! Uses reqwest for fetching and the csv crate for parsing.

use crate::record::{CommentRow, RatingRow};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// User-Agent string identifying this client
const USER_AGENT: &str = concat!("profsumma/", env!("CARGO_PKG_VERSION"));

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch {url}: {source}")]
    Request {
        url: String,
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("no source URL configured for {0}")]
    MissingUrl(&'static str),
}

/// Create a configured HTTP client
pub fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Fetch a document body, failing on any non-success status
pub async fn fetch_text(client: &Client, url: &str) -> Result<String, FetchError> {
    let request_error = |source| FetchError::Request {
        url: url.to_string(),
        source,
    };

    let response = client.get(url).send().await.map_err(request_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(request_error)?;
    debug!("fetched {} bytes from {}", body.len(), url);
    Ok(body)
}

/// Fetch both CSV documents. Either failing aborts the run.
pub async fn fetch_sources(
    client: &Client,
    ratings_url: &str,
    comments_url: &str,
) -> Result<(Vec<RatingRow>, Vec<CommentRow>), FetchError> {
    if ratings_url.trim().is_empty() {
        return Err(FetchError::MissingUrl("ratings"));
    }
    if comments_url.trim().is_empty() {
        return Err(FetchError::MissingUrl("comments"));
    }

    let ratings = parse_ratings(&fetch_text(client, ratings_url).await?);
    let comments = parse_comments(&fetch_text(client, comments_url).await?);
    Ok((ratings, comments))
}

pub fn parse_ratings(text: &str) -> Vec<RatingRow> {
    parse_rows(text, "ratings")
}

pub fn parse_comments(text: &str) -> Vec<CommentRow> {
    parse_rows(text, "comments")
}

/// Best-effort parse: rows that do not deserialize are logged and dropped.
fn parse_rows<T: DeserializeOwned>(text: &str, label: &str) -> Vec<T> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<T>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            // +2: one for the header, one for 1-based numbering
            Err(e) => warn!("skipping {} row {}: {}", label, line + 2, e),
        }
    }
    debug!("parsed {} {} rows", rows.len(), label);
    rows
}
