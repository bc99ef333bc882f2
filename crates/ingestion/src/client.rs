//! OpenAlex-style works client
//!
//! Cursor-paginated works listing over HTTP with exponential-backoff
//! retries. Responses are decoded into typed records; the inverted-index
//! abstract stays encoded until normalization.

use backoff::{future::retry, ExponentialBackoff};
use scholargraph_common::errors::{EngineError, Result};
use scholargraph_common::model::{WorkAuthor, WorkConcept, WorkRecord, WorksPage};
use scholargraph_common::store::WorksClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Works API client configuration
#[derive(Debug, Clone)]
pub struct WorksClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Contact address forwarded for polite-pool rate limits
    pub mailto: Option<String>,
    pub page_size: u32,
    pub timeout: Duration,
    pub max_elapsed: Duration,
}

impl Default for WorksClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org".to_string(),
            api_key: None,
            mailto: None,
            page_size: 200,
            timeout: Duration::from_secs(15),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

/// HTTP client for the external works corpus
pub struct OpenAlexClient {
    client: reqwest::Client,
    config: WorksClientConfig,
}

#[derive(Deserialize)]
struct ListResponse {
    results: Vec<RawWork>,
    #[serde(default)]
    meta: Option<ListMeta>,
}

#[derive(Deserialize)]
struct ListMeta {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RawWork {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    abstract_inverted_index: Option<HashMap<String, Vec<u32>>>,
    #[serde(default)]
    publication_date: Option<String>,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    authorships: Vec<RawAuthorship>,
    #[serde(default)]
    concepts: Vec<RawConcept>,
}

#[derive(Deserialize)]
struct RawAuthorship {
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    institutions: Vec<RawInstitution>,
    #[serde(default)]
    author_position: Option<String>,
}

#[derive(Deserialize)]
struct RawAuthor {
    id: Option<String>,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawInstitution {
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RawConcept {
    id: Option<String>,
    display_name: Option<String>,
}

impl OpenAlexClient {
    pub fn new(config: WorksClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("failed to build works HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn backoff_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(self.config.max_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    async fn fetch_page(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> std::result::Result<ListResponse, backoff::Error<EngineError>> {
        let per_page = limit.min(self.config.page_size).max(1);
        let url = format!("{}/works", self.config.base_url);
        let mut request = self
            .client
            .get(&url)
            .query(&[("search", query)])
            .query(&[("per-page", per_page.to_string())])
            .query(&[("cursor", cursor.unwrap_or("*"))]);
        if let Some(mailto) = &self.config.mailto {
            request = request.query(&[("mailto", mailto.as_str())]);
        }
        if let Some(api_key) = &self.config.api_key {
            request = request.query(&[("api_key", api_key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            backoff::Error::transient(EngineError::ExternalFetchFailed {
                message: format!("request failed: {e}"),
            })
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(backoff::Error::transient(EngineError::ExternalFetchFailed {
                message: format!("upstream returned {status}"),
            }));
        }
        if !status.is_success() {
            return Err(backoff::Error::permanent(EngineError::ExternalFetchFailed {
                message: format!("upstream returned {status}"),
            }));
        }

        response.json::<ListResponse>().await.map_err(|e| {
            backoff::Error::permanent(EngineError::ExternalFetchFailed {
                message: format!("failed to decode works page: {e}"),
            })
        })
    }

    fn convert(raw: RawWork) -> WorkRecord {
        let published_date = raw
            .publication_date
            .as_deref()
            .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let mut authors: Vec<(Option<String>, WorkAuthor)> = raw
            .authorships
            .into_iter()
            .map(|authorship| {
                let institution = authorship
                    .institutions
                    .first()
                    .and_then(|i| i.display_name.clone());
                let (external_id, name) = match authorship.author {
                    Some(author) => (author.id, author.display_name),
                    None => (None, None),
                };
                (
                    authorship.author_position,
                    WorkAuthor {
                        external_id,
                        name,
                        institution,
                        author_order: None,
                    },
                )
            })
            .collect();
        // First-position authors lead; listing order is otherwise preserved
        authors.sort_by_key(|(position, _)| position.as_deref() != Some("first"));
        let authors: Vec<WorkAuthor> = authors
            .into_iter()
            .enumerate()
            .map(|(idx, (_, mut author))| {
                author.author_order = Some(idx as u32 + 1);
                author
            })
            .collect();

        let concepts = raw
            .concepts
            .into_iter()
            .map(|concept| WorkConcept {
                external_id: concept.id,
                name: concept.display_name,
            })
            .collect();

        WorkRecord {
            external_id: raw.id,
            title: raw.title.or(raw.display_name),
            abstract_text: None,
            abstract_inverted_index: raw.abstract_inverted_index,
            published_date,
            doi: raw.doi,
            authors,
            concepts,
        }
    }
}

#[async_trait::async_trait]
impl WorksClient for OpenAlexClient {
    async fn fetch_works(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<WorksPage> {
        let page = retry(self.backoff_policy(), || async {
            self.fetch_page(query, cursor, limit).await.map_err(|err| {
                if matches!(err, backoff::Error::Transient { .. }) {
                    warn!(query, "Works fetch attempt failed, backing off");
                }
                err
            })
        })
        .await?;

        debug!(
            query,
            results = page.results.len(),
            has_cursor = page
                .meta
                .as_ref()
                .and_then(|m| m.next_cursor.as_ref())
                .is_some(),
            "Fetched works page"
        );

        Ok(WorksPage {
            works: page.results.into_iter().map(Self::convert).collect(),
            next_cursor: page.meta.and_then(|m| m.next_cursor),
        })
    }
}
