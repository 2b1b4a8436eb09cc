//! REST implementation of the source API
//!
//! Speaks the portal's webhook REST dialect: `GET {base}/{method}.json`
//! with offset pagination (`start`), an explicit field selection
//! (`select[]`) and comparison filters (`filter[>FIELD]`). Responses use a
//! `{result, total, next}` envelope where `next` is absent on the last
//! page. The server caps pages at 50 records regardless of the request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::debug;

use crate::entity::EntityKind;
use crate::error::{SourceError, SyncError};
use crate::record::RawRecord;
use crate::source::{Page, RecordFilter, SourceApi};
use crate::types::SensitiveString;

/// Page length the upstream API serves
const PAGE_SIZE: u32 = 50;

/// Request timeout for a single page
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Error code the source uses when shedding load
const QUERY_LIMIT_CODE: &str = "QUERY_LIMIT_EXCEEDED";

/// Response envelope for list endpoints
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    result: Option<Json>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    next: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// REST source over a credentialed webhook base URL
pub struct RestSource {
    client: reqwest::Client,
    endpoint: SensitiveString,
}

impl RestSource {
    /// Create a source client for the given credentialed endpoint.
    pub fn new(endpoint: SensitiveString) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| SyncError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, endpoint })
    }

    fn method_url(&self, kind: EntityKind) -> String {
        format!(
            "{}/{}.json",
            self.endpoint.expose_secret().trim_end_matches('/'),
            kind.endpoint()
        )
    }
}

#[async_trait]
impl SourceApi for RestSource {
    fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    async fn check(&self) -> Result<(), SourceError> {
        // the cheapest credentialed call: first page of users
        self.fetch_page(EntityKind::Manager, &RecordFilter::all(), 0)
            .await
            .map(|_| ())
    }

    async fn fetch_page(
        &self,
        kind: EntityKind,
        filter: &RecordFilter,
        offset: u64,
    ) -> Result<Page, SourceError> {
        let params = build_params(kind, filter, offset);
        let response = self
            .client
            .get(self.method_url(kind))
            .query(&params)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| SourceError::malformed(format!("invalid JSON body: {e}")))?;

        let page = envelope_to_page(envelope)?;
        debug!(
            entity = %kind,
            offset,
            records = page.records.len(),
            total = page.total,
            "fetched source page"
        );
        Ok(page)
    }
}

/// Build the query string for one page request.
fn build_params(kind: EntityKind, filter: &RecordFilter, offset: u64) -> Vec<(String, String)> {
    let mut params = vec![("start".to_string(), offset.to_string())];

    for field in kind.select_fields() {
        params.push(("select[]".to_string(), (*field).to_string()));
    }

    // the user endpoint would otherwise include deactivated accounts
    if kind == EntityKind::Manager {
        params.push(("filter[ACTIVE]".to_string(), "Y".to_string()));
    }

    if let Some(bound) = filter.modified_after {
        params.push((
            format!("filter[>{}]", kind.modified_field()),
            bound.to_rfc3339(),
        ));
    }

    params
}

fn classify_transport(error: reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout(error.to_string())
    } else {
        SourceError::connection(error.to_string())
    }
}

/// Map an HTTP error status onto the source error taxonomy.
fn classify_status(status: u16, body: &str) -> SourceError {
    let message = truncate(body, 200);
    match status {
        429 => SourceError::RateLimited(message),
        503 if body.contains(QUERY_LIMIT_CODE) => SourceError::RateLimited(message),
        500..=599 => SourceError::Server { status, message },
        _ => SourceError::Api { status, message },
    }
}

fn envelope_to_page(envelope: ApiEnvelope) -> Result<Page, SourceError> {
    if let Some(code) = envelope.error {
        let message = format!(
            "{code}: {}",
            envelope.error_description.unwrap_or_default()
        );
        if code == QUERY_LIMIT_CODE {
            return Err(SourceError::RateLimited(message));
        }
        return Err(SourceError::Api {
            status: 200,
            message,
        });
    }

    let result = envelope
        .result
        .ok_or_else(|| SourceError::malformed("envelope is missing 'result'"))?;
    let entries = match result {
        Json::Array(entries) => entries,
        other => {
            return Err(SourceError::malformed(format!(
                "'result' is not an array but {}",
                json_kind(&other)
            )))
        }
    };

    Ok(Page {
        records: entries.into_iter().map(RawRecord::new).collect(),
        next: envelope.next,
        total: envelope.total,
    })
}

fn json_kind(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a bool",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_build_params_full() {
        let params = build_params(EntityKind::Deal, &RecordFilter::all(), 100);
        assert!(params.contains(&("start".to_string(), "100".to_string())));
        assert!(params.contains(&("select[]".to_string(), "OPPORTUNITY".to_string())));
        assert!(!params.iter().any(|(k, _)| k.starts_with("filter[>")));
    }

    #[test]
    fn test_build_params_incremental_uses_kind_field() {
        let bound = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let params = build_params(
            EntityKind::Activity,
            &RecordFilter::modified_after(bound),
            0,
        );
        let filter = params
            .iter()
            .find(|(k, _)| k == "filter[>LAST_UPDATED]")
            .expect("modification filter");
        assert!(filter.1.starts_with("2024-03-01T00:00:00"));
    }

    #[test]
    fn test_build_params_manager_selects_active() {
        let params = build_params(EntityKind::Manager, &RecordFilter::all(), 0);
        assert!(params.contains(&("filter[ACTIVE]".to_string(), "Y".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "select[]"));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(429, ""),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(503, r#"{"error":"QUERY_LIMIT_EXCEEDED"}"#),
            SourceError::RateLimited(_)
        ));
        assert!(matches!(
            classify_status(503, "maintenance"),
            SourceError::Server { status: 503, .. }
        ));
        assert!(matches!(
            classify_status(502, ""),
            SourceError::Server { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(400, "bad filter"),
            SourceError::Api { status: 400, .. }
        ));
    }

    #[test]
    fn test_envelope_to_page() {
        let envelope: ApiEnvelope = serde_json::from_value(json!({
            "result": [{"ID": "1"}, {"ID": "2"}],
            "total": 120,
            "next": 50
        }))
        .unwrap();
        let page = envelope_to_page(envelope).unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.next, Some(50));
        assert_eq!(page.total, Some(120));
    }

    #[test]
    fn test_envelope_missing_result_is_malformed() {
        let envelope: ApiEnvelope = serde_json::from_value(json!({"total": 0})).unwrap();
        assert!(matches!(
            envelope_to_page(envelope),
            Err(SourceError::Malformed(_))
        ));

        let envelope: ApiEnvelope =
            serde_json::from_value(json!({"result": "not-a-list"})).unwrap();
        assert!(matches!(
            envelope_to_page(envelope),
            Err(SourceError::Malformed(_))
        ));
    }

    #[test]
    fn test_envelope_error_codes() {
        let envelope: ApiEnvelope = serde_json::from_value(json!({
            "error": "QUERY_LIMIT_EXCEEDED",
            "error_description": "Too many requests"
        }))
        .unwrap();
        assert!(matches!(
            envelope_to_page(envelope),
            Err(SourceError::RateLimited(_))
        ));

        let envelope: ApiEnvelope = serde_json::from_value(json!({
            "error": "INVALID_CREDENTIALS"
        }))
        .unwrap();
        assert!(matches!(
            envelope_to_page(envelope),
            Err(SourceError::Api { .. })
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let long = "x".repeat(300);
        assert_eq!(truncate(&long, 200).len(), 203);
    }
}
