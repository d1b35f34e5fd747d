//! libSQL remote over the Hrana HTTP pipeline API (`POST /v2/pipeline`).
//!
//! Each call opens a stream, runs its statements in order and closes the
//! stream in the same request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD_NO_PAD as BASE64, Engine};
use serde::{Deserialize, Serialize};

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::types::{ExecuteResult, Row, SqlValue};

use super::replication::{BatchStatement, RemoteConnector, RemoteDatabase};
use crate::adapters::http::{send, truncate_for_log};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============ Wire format ============

#[derive(Debug, Serialize)]
struct PipelineRequest {
    baton: Option<String>,
    requests: Vec<StreamRequest>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest {
    Execute { stmt: Stmt },
    Close,
}

#[derive(Debug, Serialize)]
struct Stmt {
    sql: String,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HranaValue {
    Null,
    /// 64-bit integers travel as strings
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
    Execute { result: StmtResult },
    Close,
}

#[derive(Debug, Deserialize)]
struct StmtResult {
    #[serde(default)]
    cols: Vec<Col>,
    #[serde(default)]
    rows: Vec<Vec<HranaValue>>,
    #[serde(default)]
    affected_row_count: u64,
    last_insert_rowid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Col {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HranaError {
    message: String,
    code: Option<String>,
}

impl From<SqlValue> for HranaValue {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Self::Null,
            SqlValue::Integer(v) => Self::Integer {
                value: v.to_string(),
            },
            SqlValue::Real(v) => Self::Float { value: v },
            SqlValue::Text(v) => Self::Text { value: v },
            SqlValue::Blob(v) => Self::Blob {
                base64: BASE64.encode(v),
            },
        }
    }
}

impl HranaValue {
    fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer { value } => value
                .parse::<i64>()
                .map_or(serde_json::Value::String(value), serde_json::Value::from),
            Self::Float { value } => serde_json::Value::from(value),
            Self::Text { value } => serde_json::Value::String(value),
            Self::Blob { base64 } => serde_json::Value::String(base64),
        }
    }
}

impl StmtResult {
    fn into_rows(self) -> Vec<Row> {
        let names: Vec<String> = self
            .cols
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.name.unwrap_or_else(|| format!("column{i}")))
            .collect();

        self.rows
            .into_iter()
            .map(|values| {
                names
                    .iter()
                    .cloned()
                    .zip(values.into_iter().map(HranaValue::into_json))
                    .collect()
            })
            .collect()
    }

    fn execute_result(&self) -> ExecuteResult {
        ExecuteResult {
            rows_affected: self.affected_row_count,
            last_insert_id: self
                .last_insert_rowid
                .as_deref()
                .and_then(|id| id.parse().ok())
                .unwrap_or_default(),
        }
    }
}

// ============ Client ============

/// `libsql://host` -> `https://host/v2/pipeline`
pub(crate) fn pipeline_url(url: &str) -> CoreResult<String> {
    let url = url.trim().trim_end_matches('/');
    let base = if let Some(host) = url.strip_prefix("libsql://") {
        format!("https://{host}")
    } else if url.starts_with("https://") || url.starts_with("http://") {
        url.to_string()
    } else {
        return Err(CoreError::ValidationError(format!(
            "Unsupported sync URL scheme: {url}"
        )));
    };
    Ok(format!("{base}/v2/pipeline"))
}

/// Remote libSQL database
pub struct HranaRemote {
    client: reqwest::Client,
    pipeline_url: String,
    auth_token: String,
}

impl HranaRemote {
    pub fn new(client: reqwest::Client, url: &str, auth_token: &str) -> CoreResult<Self> {
        Ok(Self {
            client,
            pipeline_url: pipeline_url(url)?,
            auth_token: auth_token.to_string(),
        })
    }

    async fn pipeline(&self, statements: Vec<BatchStatement>, want_rows: bool) -> CoreResult<Vec<StmtResult>> {
        let count = statements.len();
        let mut requests: Vec<StreamRequest> = statements
            .into_iter()
            .map(|(sql, params)| StreamRequest::Execute {
                stmt: Stmt {
                    sql,
                    args: params.into_iter().map(HranaValue::from).collect(),
                    want_rows,
                },
            })
            .collect();
        requests.push(StreamRequest::Close);

        let request = self
            .client
            .post(&self.pipeline_url)
            .bearer_auth(&self.auth_token)
            .json(&PipelineRequest {
                baton: None,
                requests,
            });
        let (status, body) = send(request, "libsql", &self.pipeline_url).await?;

        if status == 401 || status == 403 {
            return Err(CoreError::NetworkError(format!(
                "Remote database rejected the auth token (HTTP {status})"
            )));
        }
        if !(200..300).contains(&status) {
            return Err(CoreError::NetworkError(format!(
                "Remote database returned HTTP {status}: {}",
                truncate_for_log(&body)
            )));
        }

        let response: PipelineResponse = serde_json::from_str(&body).map_err(|e| {
            log::error!("[libsql] Invalid pipeline response: {}", truncate_for_log(&body));
            CoreError::SerializationError(format!("Invalid pipeline response: {e}"))
        })?;

        let mut results = Vec::with_capacity(count);
        for result in response.results.into_iter().take(count) {
            match result {
                StreamResult::Ok {
                    response: StreamResponse::Execute { result },
                } => results.push(result),
                StreamResult::Ok {
                    response: StreamResponse::Close,
                } => {}
                StreamResult::Error { error } => {
                    return Err(CoreError::StorageError(format!(
                        "Remote statement failed ({}): {}",
                        error.code.as_deref().unwrap_or("UNKNOWN"),
                        error.message
                    )));
                }
            }
        }

        if results.len() != count {
            return Err(CoreError::SerializationError(format!(
                "Expected {count} results from remote, got {}",
                results.len()
            )));
        }
        Ok(results)
    }
}

#[async_trait]
impl RemoteDatabase for HranaRemote {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> CoreResult<Vec<Row>> {
        let mut results = self
            .pipeline(vec![(sql.to_string(), params)], true)
            .await?;
        Ok(results.pop().map(StmtResult::into_rows).unwrap_or_default())
    }

    async fn execute_batch(
        &self,
        statements: Vec<BatchStatement>,
    ) -> CoreResult<Vec<ExecuteResult>> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        let results = self.pipeline(statements, false).await?;
        Ok(results.iter().map(StmtResult::execute_result).collect())
    }
}

/// Connects `HranaRemote`s sharing one HTTP client
pub struct HranaConnector {
    client: reqwest::Client,
}

impl HranaConnector {
    /// # Errors
    /// Returns `CoreError::NetworkError` if the HTTP client cannot be built.
    pub fn new() -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl RemoteConnector for HranaConnector {
    fn connect(&self, url: &str, auth_token: &str) -> CoreResult<Arc<dyn RemoteDatabase>> {
        Ok(Arc::new(HranaRemote::new(self.client.clone(), url, auth_token)?))
    }
}
