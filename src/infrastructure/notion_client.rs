use crate::domain::models::{RawRecord, RichTextSegment};
use crate::infrastructure::error::ApiError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const NOTION_API_BASE: &str = "https://api.notion.com/v1/";
pub const NOTION_VERSION: &str = "2025-09-03";
pub const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const ERROR_INVALID_CREDENTIALS: &str = "Invalid credentials";
const ERROR_INVALID_DATABASE_ID: &str = "Invalid database id";
const ERROR_RESOURCE_NOT_FOUND: &str = "Resource not found";
const ERROR_RATE_LIMIT: &str = "Rate limit exceeded";
const ERROR_UNEXPECTED_RESPONSE: &str = "Unexpected response";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct DataSourceRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct DatabaseMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Vec<RichTextSegment>,
    #[serde(default)]
    pub data_sources: Option<Vec<DataSourceRef>>,
    #[serde(default)]
    pub data_source: Option<DataSourceRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct DatabaseSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub title: Vec<RichTextSegment>,
}

#[async_trait]
pub trait NotionClient: Send + Sync {
    async fn get_database(&self, database_id: &str) -> Result<DatabaseMetadata, ApiError>;

    async fn query_data_source(&self, data_source_id: &str) -> Result<Vec<RawRecord>, ApiError>;

    async fn search_databases(&self) -> Result<Vec<DatabaseSummary>, ApiError>;
}

#[derive(Debug, Deserialize)]
struct PageResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReqwestNotionClient {
    client: Client,
    token: String,
    base_url: String,
}

impl ReqwestNotionClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, NOTION_API_BASE)
    }

    /// Points the client at another API root, e.g. a local mock server.
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into().trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: Client::new(),
            token: token.into(),
            base_url,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| ApiError::Api(format!("invalid api base url: {error}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::Api("api base URL cannot be a base".to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn classify_status(status: StatusCode) -> Option<ApiError> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Some(ApiError::Authentication(ERROR_INVALID_CREDENTIALS.to_string()))
            }
            StatusCode::BAD_REQUEST => {
                Some(ApiError::NotFound(ERROR_INVALID_DATABASE_ID.to_string()))
            }
            StatusCode::NOT_FOUND => Some(ApiError::NotFound(ERROR_RESOURCE_NOT_FOUND.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Some(ApiError::RateLimit(ERROR_RATE_LIMIT.to_string())),
            status if !status.is_success() => Some(ApiError::Api(format!(
                "Error fetching information - http {}",
                status.as_u16()
            ))),
            _ => None,
        }
    }

    fn transport_error(error: reqwest::Error) -> ApiError {
        if error.is_timeout() {
            return ApiError::Communication(format!(
                "Timeout error fetching information - {error}"
            ));
        }
        if error.is_decode() || error.is_builder() {
            return ApiError::Api(format!("Unexpected error - {error}"));
        }
        ApiError::Communication(format!("Error fetching information - {error}"))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .timeout(REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(Self::transport_error)?;
        if let Some(error) = Self::classify_status(response.status()) {
            return Err(error);
        }

        let body = response.text().await.map_err(Self::transport_error)?;
        if body.trim().is_empty() {
            return Err(ApiError::Api(ERROR_UNEXPECTED_RESPONSE.to_string()));
        }
        serde_json::from_str(&body)
            .map_err(|error| ApiError::Api(format!("Unexpected error - {error}")))
    }

    /// Follows `next_cursor` until `has_more` is false and returns every page's results
    /// in page order.
    async fn paginate<T: DeserializeOwned>(
        &self,
        url: Url,
        mut payload: serde_json::Value,
    ) -> Result<Vec<T>, ApiError> {
        let mut results = Vec::new();
        let mut pages: u32 = 0;

        loop {
            let mut page: PageResponse<T> = self
                .request(Method::POST, url.clone(), Some(&payload))
                .await?;
            pages = pages.saturating_add(1);
            results.append(&mut page.results);

            if !page.has_more {
                break;
            }
            let Some(cursor) = page.next_cursor.filter(|cursor| !cursor.is_empty()) else {
                tracing::warn!(%url, pages, "has_more without next_cursor; stopping pagination");
                break;
            };
            payload["start_cursor"] = serde_json::Value::String(cursor);
        }

        tracing::debug!(%url, pages, results = results.len(), "pagination finished");
        Ok(results)
    }
}

#[async_trait]
impl NotionClient for ReqwestNotionClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_database(&self, database_id: &str) -> Result<DatabaseMetadata, ApiError> {
        let url = self.endpoint(&["databases", database_id])?;
        self.request(Method::GET, url, None).await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn query_data_source(&self, data_source_id: &str) -> Result<Vec<RawRecord>, ApiError> {
        let url = self.endpoint(&["data_sources", data_source_id, "query"])?;
        let results: Vec<serde_json::Value> = self
            .paginate(url, serde_json::json!({ "page_size": PAGE_SIZE }))
            .await?;
        Ok(results.iter().map(RawRecord::from_value).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn search_databases(&self) -> Result<Vec<DatabaseSummary>, ApiError> {
        let url = self.endpoint(&["search"])?;
        self.paginate(
            url,
            serde_json::json!({
                "page_size": PAGE_SIZE,
                "filter": {"property": "object", "value": "database"},
            }),
        )
        .await
    }
}
