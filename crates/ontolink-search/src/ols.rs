//! HTTP search client for the EBI Ontology Lookup Service (OLS4).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use ontolink_core::{OntologyBinding, SearchCandidate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::backend::{OntologySearch, SearchError};

pub const DEFAULT_OLS_URL: &str = "https://www.ebi.ac.uk/ols4";
const DEFAULT_ROWS: usize = 10;

/// OLS4 `/api/search` client.
pub struct OlsClient {
    client: reqwest::Client,
    base_url: String,
    rows: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    response: SearchDocs,
}

#[derive(Deserialize)]
struct SearchDocs {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Deserialize)]
struct SearchDoc {
    obo_id: Option<String>,
    label: Option<String>,
}

impl OlsClient {
    /// Create a client for the given OLS base URL.
    ///
    /// `base_url` should be like `https://www.ebi.ac.uk/ols4` (no trailing slash).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            rows: DEFAULT_ROWS,
        }
    }

    /// Rebuild the underlying HTTP client with a request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, SearchError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Maximum number of hits requested per query.
    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows.max(1);
        self
    }
}

impl Default for OlsClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLS_URL.to_string())
    }
}

#[async_trait]
impl OntologySearch for OlsClient {
    async fn search(
        &self,
        ontology: &OntologyBinding,
        term: &str,
    ) -> Result<Vec<SearchCandidate>, SearchError> {
        let url = format!("{}/api/search", self.base_url);
        let rows = self.rows.to_string();

        debug!(url = %url, ontology = ontology.ols_id(), term, "querying OLS");
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", term),
                ("ontology", ontology.ols_id()),
                ("rows", rows.as_str()),
                ("local", "true"),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await?;
        let parsed: SearchResponse = serde_json::from_str(&body)?;
        let candidates = collect_candidates(ontology, parsed.response.docs);
        info!(
            ontology = ontology.ols_id(),
            term,
            count = candidates.len(),
            "OLS search complete"
        );
        Ok(candidates)
    }
}

/// Keep docs with an id in `ontology` and a label, first occurrence of each id.
fn collect_candidates(ontology: &OntologyBinding, docs: Vec<SearchDoc>) -> Vec<SearchCandidate> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter_map(|doc| match (doc.obo_id, doc.label) {
            (Some(id), Some(label)) if ontology.owns(&id) => Some(SearchCandidate::new(id, label)),
            _ => None,
        })
        .filter(|c| seen.insert(c.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn goblet_docs() -> serde_json::Value {
        json!({
            "response": {
                "numFound": 4,
                "docs": [
                    { "obo_id": "CL:0000160", "label": "goblet cell", "ontology_name": "cl" },
                    { "obo_id": "CL:1000320", "label": "large intestine goblet cell" },
                    { "obo_id": "CL:0000160", "label": "goblet cell" },
                    { "obo_id": "UBERON:0001155", "label": "colon" },
                    { "label": "no id" }
                ]
            }
        })
    }

    #[test]
    fn ols_client_trims_trailing_slash() {
        let client = OlsClient::new("https://www.ebi.ac.uk/ols4/".into());
        assert_eq!(client.base_url, "https://www.ebi.ac.uk/ols4");
    }

    #[test]
    fn rows_at_least_one() {
        assert_eq!(OlsClient::default().with_rows(0).rows, 1);
    }

    #[tokio::test]
    async fn search_parses_and_filters_docs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .and(query_param("q", "goblet cell"))
            .and(query_param("ontology", "cl"))
            .and(query_param("local", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(goblet_docs()))
            .mount(&server)
            .await;

        let client = OlsClient::new(server.uri());
        let hits = client
            .search(&OntologyBinding::cell_ontology(), "goblet cell")
            .await
            .unwrap();

        assert_eq!(
            hits,
            vec![
                SearchCandidate::new("CL:0000160", "goblet cell"),
                SearchCandidate::new("CL:1000320", "large intestine goblet cell"),
            ]
        );
    }

    #[tokio::test]
    async fn search_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(goblet_docs()))
            .mount(&server)
            .await;

        let client = OlsClient::new(server.uri());
        let cl = OntologyBinding::cell_ontology();
        let first = client.search(&cl, "goblet cell").await.unwrap();
        let second = client.search(&cl, "goblet cell").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_docs_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": { "numFound": 0, "docs": [] } })),
            )
            .mount(&server)
            .await;

        let hits = OlsClient::new(server.uri())
            .search(&OntologyBinding::uberon(), "zzz")
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = OlsClient::new(server.uri())
            .search(&OntologyBinding::cell_ontology(), "goblet cell")
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert!(matches!(err, SearchError::Server { status: 429, ref body } if body == "slow down"));
    }

    #[tokio::test]
    async fn garbage_body_is_json_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = OlsClient::new(server.uri())
            .search(&OntologyBinding::cell_ontology(), "goblet cell")
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Json(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_http_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = OlsClient::new("http://127.0.0.1:9".into())
            .with_timeout(Duration::from_secs(2))
            .unwrap();
        let err = client
            .search(&OntologyBinding::cell_ontology(), "goblet cell")
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Http(_)));
    }
}
