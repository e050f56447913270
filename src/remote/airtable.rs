//! HTTP client for the Airtable REST API.
//!
//! The sync engine is synchronous, so each client owns a tokio runtime and
//! blocks on every request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    DeleteResponse, FieldMap, RemoteConnector, RemoteError, RemoteRecord, RemoteTableClient,
    TableKey,
};
use crate::config::SyncConfiguration;

/// Default REST endpoint.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.airtable.com/v0";

const PAGE_SIZE: &str = "100";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds [`AirtableClient`]s, one per remote table.
pub struct AirtableConnector {
    api_key: Option<String>,
    endpoint: String,
    clients: Mutex<HashMap<TableKey, Arc<AirtableClient>>>,
}

impl AirtableConnector {
    #[must_use]
    pub fn new(api_key: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            clients: Mutex::new(HashMap::new()),
        }
    }
}

impl RemoteConnector for AirtableConnector {
    fn connect(
        &self,
        config: &SyncConfiguration,
    ) -> Result<Arc<dyn RemoteTableClient>, RemoteError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(RemoteError::NotConfigured("no API key configured".to_string()));
        };

        let key = TableKey::new(&config.remote_base, &config.remote_table);
        let mut clients = self
            .clients
            .lock()
            .map_err(|_| RemoteError::NotConfigured("client cache poisoned".to_string()))?;

        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client) as Arc<dyn RemoteTableClient>);
        }

        let client = Arc::new(AirtableClient::new(
            &self.endpoint,
            &config.remote_base,
            &config.remote_table,
            api_key,
        )?);
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }
}

/// Blocking client bound to one base/table pair.
pub struct AirtableClient {
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
    endpoint: String,
    base: String,
    table: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct FieldsBody<'a> {
    fields: &'a FieldMap,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<RemoteRecord>,
    offset: Option<String>,
}

impl AirtableClient {
    /// Create a client for `base`/`table`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotConfigured`] if the runtime or HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, base: &str, table: &str, api_key: &str) -> Result<Self, RemoteError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| RemoteError::NotConfigured(format!("failed to start runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            runtime,
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            base: base.to_string(),
            table: table.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, record_id: Option<&str>) -> Result<reqwest::Url, RemoteError> {
        let mut url = reqwest::Url::parse(&self.endpoint).map_err(|e| {
            RemoteError::NotConfigured(format!("invalid API endpoint {}: {e}", self.endpoint))
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                RemoteError::NotConfigured(format!("invalid API endpoint {}", self.endpoint))
            })?;
            segments.pop_if_empty().push(&self.base).push(&self.table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, RemoteError> {
        self.runtime.block_on(async {
            let response = request
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| RemoteError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let url = response.url().to_string();
                let body = response.text().await.unwrap_or_default();
                return Err(RemoteError::Http(format_http_error(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                    &url,
                    &body,
                )));
            }

            response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Transport(format!("invalid response body: {e}")))
        })
    }

    fn list(&self, formula: Option<&str>) -> Result<Vec<RemoteRecord>, RemoteError> {
        let url = self.url(None)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("pageSize", PAGE_SIZE)];
            if let Some(formula) = formula {
                query.push(("filterByFormula", formula));
            }
            if let Some(offset) = offset.as_deref() {
                query.push(("offset", offset));
            }

            let page: ListResponse = self.send(self.http.get(url.clone()).query(&query))?;
            trace!(table = %self.table, rows = page.records.len(), "Fetched page");
            records.extend(page.records);

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        Ok(records)
    }
}

impl RemoteTableClient for AirtableClient {
    fn table_key(&self) -> TableKey {
        TableKey::new(&self.base, &self.table)
    }

    fn get(&self, record_id: &str) -> Result<RemoteRecord, RemoteError> {
        let url = self.url(Some(record_id))?;
        self.send(self.http.get(url))
    }

    fn create(&self, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let url = self.url(None)?;
        let record: RemoteRecord = self.send(self.http.post(url).json(&FieldsBody { fields }))?;
        debug!(table = %self.table, id = %record.id, "Created remote record");
        Ok(record)
    }

    fn update(&self, record_id: &str, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let url = self.url(Some(record_id))?;
        self.send(self.http.patch(url).json(&FieldsBody { fields }))
    }

    fn delete(&self, record_id: &str) -> Result<DeleteResponse, RemoteError> {
        let url = self.url(Some(record_id))?;
        self.send(self.http.delete(url))
    }

    fn search(&self, column: &str, value: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.list(Some(&search_formula(column, value)))
    }

    fn list_all(&self) -> Result<Vec<RemoteRecord>, RemoteError> {
        self.list(None)
    }
}

/// `{Column}='value'` with the value quoted for the formula language.
#[must_use]
pub(crate) fn search_formula(column: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{{column}}}='{escaped}'")
}

/// Render a failed response as a single error line.
///
/// The `error` member of a JSON body becomes the bracketed suffix; bodies
/// without one leave the suffix off.
#[must_use]
pub(crate) fn format_http_error(code: u16, reason: &str, url: &str, body: &str) -> String {
    let kind = if code >= 500 { "Server" } else { "Client" };
    let mut line = format!("{code} {kind} Error: {reason} for url: {url}");

    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());
    match detail {
        Some(serde_json::Value::String(s)) => line.push_str(&format!(" [Error: {s}]")),
        Some(other) => line.push_str(&format!(" [Error: {other}]")),
        None => {}
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::parse_request_error;

    #[test]
    fn test_search_formula_escapes_quotes() {
        assert_eq!(search_formula("Slug", "a-slug"), "{Slug}='a-slug'");
        assert_eq!(search_formula("Name", "O'Neil"), r"{Name}='O\'Neil'");
    }

    #[test]
    fn test_format_http_error_not_found() {
        let line = format_http_error(404, "Not Found", "https://x/app/T/rec1", r#"{"error":"NOT_FOUND"}"#);
        assert_eq!(
            line,
            "404 Client Error: Not Found for url: https://x/app/T/rec1 [Error: NOT_FOUND]"
        );
        assert_eq!(parse_request_error(&line).error_type, "NOT_FOUND");
    }

    #[test]
    fn test_format_http_error_structured_body_parses() {
        let body = r#"{"error":{"type":"INVALID_PERMISSIONS","message":"You are not permitted"}}"#;
        let line = format_http_error(403, "Forbidden", "https://x/app/T", body);
        let details = parse_request_error(&line);
        assert_eq!(details.status_code, 403);
        assert_eq!(details.error_type, "INVALID_PERMISSIONS");
        assert_eq!(details.message, "You are not permitted");
    }

    #[test]
    fn test_format_http_error_503_without_body() {
        let line = format_http_error(503, "Service Unavailable", "https://x/app/T", "");
        assert_eq!(parse_request_error(&line).error_type, "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn test_url_encodes_table_name() {
        let client = AirtableClient::new(DEFAULT_API_ENDPOINT, "app1", "My Table", "key").unwrap();
        let url = client.url(Some("rec1")).unwrap();
        assert_eq!(url.as_str(), "https://api.airtable.com/v0/app1/My%20Table/rec1");
    }

    #[test]
    fn test_connector_without_key_is_not_configured() {
        let connector = AirtableConnector::new(None, None);
        let cfg = SyncConfiguration {
            remote_base: "app1".into(),
            remote_table: "T".into(),
            ..SyncConfiguration::default()
        };
        assert!(matches!(
            connector.connect(&cfg),
            Err(RemoteError::NotConfigured(_))
        ));
    }
}
