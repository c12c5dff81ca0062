//! Uploads documents to the knowledge-base ingestion endpoint.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("cannot read {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// How an upload attempt ended, for the status line.
#[derive(Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No files were selected; no request was issued.
    NothingSelected,
    /// The server accepted the documents and reports new chunks.
    Added(u64),
    /// The server answered but did not accept the upload
    /// (ok false, non-2xx, or an unreadable body).
    Rejected,
}

/// The ingestion endpoint's response body.
#[derive(Deserialize, Debug)]
struct IngestResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    added_chunks: Option<u64>,
}

/// Client for the knowledge-base ingestion endpoint.
pub struct KbClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl KbClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Uploads documents as one multipart request, one `files` part per
    /// document. An empty selection short-circuits without any request.
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestOutcome, IngestError> {
        if paths.is_empty() {
            return Ok(IngestOutcome::NothingSelected);
        }

        let mut form = Form::new();
        for path in paths {
            let bytes = tokio::fs::read(path).await.map_err(|e| IngestError::File {
                path: path.clone(),
                source: e,
            })?;
            form = form.part("files", Part::bytes(bytes).file_name(display_name(path)));
        }

        let response = self
            .http
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            info!(%status, "ingestion request rejected");
            return Ok(IngestOutcome::Rejected);
        }

        Ok(parse_outcome(&body))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document")
        .to_string()
}

fn parse_outcome(body: &str) -> IngestOutcome {
    match serde_json::from_str::<IngestResponse>(body) {
        Ok(resp) if resp.ok => IngestOutcome::Added(resp.added_chunks.unwrap_or(0)),
        Ok(_) => IngestOutcome::Rejected,
        Err(_) => IngestOutcome::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_selection_issues_no_request() {
        // The endpoint is unroutable; reaching it would fail the test.
        let client = KbClient::new("http://192.0.2.1:1/api/kb/ingest".parse().unwrap());
        let outcome = client.ingest(&[]).await.unwrap();
        assert_eq!(outcome, IngestOutcome::NothingSelected);
    }

    #[tokio::test]
    async fn missing_file_is_reported_before_any_request() {
        let client = KbClient::new("http://192.0.2.1:1/api/kb/ingest".parse().unwrap());
        let err = client
            .ingest(&[PathBuf::from("/no/such/file.txt")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::File { .. }));
    }

    #[test]
    fn successful_body_reports_the_chunk_count() {
        assert_eq!(
            parse_outcome(r#"{"ok": true, "added_chunks": 12}"#),
            IngestOutcome::Added(12)
        );
        // A truthy ok with no count still succeeds.
        assert_eq!(parse_outcome(r#"{"ok": true}"#), IngestOutcome::Added(0));
    }

    #[test]
    fn falsy_or_malformed_bodies_are_rejected() {
        assert_eq!(parse_outcome(r#"{"ok": false}"#), IngestOutcome::Rejected);
        assert_eq!(parse_outcome("{}"), IngestOutcome::Rejected);
        assert_eq!(parse_outcome("<html>oops</html>"), IngestOutcome::Rejected);
    }

    #[test]
    fn display_name_falls_back_for_odd_paths() {
        assert_eq!(display_name(Path::new("docs/notes.md")), "notes.md");
        assert_eq!(display_name(Path::new("/")), "document");
    }
}
