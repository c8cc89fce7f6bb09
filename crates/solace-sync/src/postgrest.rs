//! # PostgREST Remote Store
//!
//! [`RemoteStore`] backed by a Supabase project's REST endpoint.
//!
//! ## Requests
//! ```text
//! fetch:   GET   {url}/rest/v1/{table}?select=user_id,data,data_version,updated_at
//!                                      &user_id=eq.{user_id}&limit=1
//!          → [] or [{ user_id, data, data_version, updated_at }]
//!
//! upsert:  1. PATCH {table}?user_id=eq.{user_id}&data->_localUpdatedAt=lte.{ts}
//!             Prefer: return=representation        { data, data_version }
//!             → one row: done
//!          2. POST  {table}?on_conflict=user_id
//!             Prefer: resolution=ignore-duplicates,return=representation
//!             { user_id, data, data_version }
//!             → one row: done
//!          3. PATCH again (a first insert from another device raced step 2)
//!             → zero rows: the stored record is newer, write skipped
//! ```
//!
//! The `_localUpdatedAt` guard runs inside the database, so an older write
//! that reaches the server after a newer one never replaces it. `->` keeps
//! the JSON number, so the comparison is numeric.
//!
//! Requests carry `apikey: <api key>` and `Authorization: Bearer <token>`,
//! where the token is the signed-in user's access token when one is set.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use solace_core::{CloudRecord, SyncableData};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;

const REST_PATH: &str = "rest/v1";
const SELECT_COLUMNS: &str = "user_id,data,data_version,updated_at";
const GUARD_COLUMN: &str = "data->_localUpdatedAt";

// =============================================================================
// Table Operations
// =============================================================================

/// The three PostgREST operations the conditional write is built from.
#[async_trait]
pub trait RestTable: Send + Sync {
    /// `GET ?user_id=eq.X&limit=1`.
    async fn select(&self, user_id: &str) -> SyncResult<Option<CloudRecord>>;

    /// `PATCH ?user_id=eq.X&data->_localUpdatedAt=lte.{not_after}`.
    /// Returns true when a row was updated.
    async fn update_unless_newer(&self, record: &CloudRecord, not_after: i64) -> SyncResult<bool>;

    /// `POST` with `resolution=ignore-duplicates`. Returns true when a row
    /// was inserted, false when one already existed.
    async fn insert_if_absent(&self, record: &CloudRecord) -> SyncResult<bool>;
}

/// HTTP client for the per-user sync table.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    client: Client,
    base_url: String,
    table: String,
    api_key: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl PostgrestClient {
    /// Creates a client for `{url}/rest/v1/{table}`.
    pub fn new(
        url: &str,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let base_url = normalize_rest_url(url)?;
        let table = table.into();
        if table.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote table must not be empty".into()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            table,
            api_key: api_key.into(),
            access_token: None,
            timeout,
        })
    }

    /// Authenticates requests as the signed-in user.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self) -> SyncResult<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, self.table))?)
    }

    fn headers(&self) -> SyncResult<HeaderMap> {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(&self.api_key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {bearer}"))?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout.as_secs())
        } else {
            SyncError::from(err)
        }
    }

    /// Sends `request` and decodes the JSON array it answers with.
    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<Vec<T>> {
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport_error(e))?;
        if !status.is_success() {
            return Err(SyncError::RemoteApi {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        serde_json::from_str(&body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl RestTable for PostgrestClient {
    #[instrument(skip(self), fields(table = %self.table))]
    async fn select(&self, user_id: &str) -> SyncResult<Option<CloudRecord>> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", SELECT_COLUMNS)
            .append_pair("user_id", &format!("eq.{user_id}"))
            .append_pair("limit", "1");

        let mut rows: Vec<CloudRecord> = self.rows(self.client.get(url)).await?;
        debug!(rows = rows.len(), "Fetched cloud record");

        Ok(if rows.is_empty() { None } else { Some(rows.swap_remove(0)) })
    }

    #[instrument(skip(self, record), fields(table = %self.table, user_id = %record.user_id))]
    async fn update_unless_newer(&self, record: &CloudRecord, not_after: i64) -> SyncResult<bool> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "user_id")
            .append_pair("user_id", &format!("eq.{}", record.user_id))
            .append_pair(GUARD_COLUMN, &format!("lte.{not_after}"));

        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .json(&PatchBody::from(record));
        let rows: Vec<serde_json::Value> = self.rows(request).await?;

        debug!(updated = rows.len(), "Guarded update");
        Ok(!rows.is_empty())
    }

    #[instrument(skip(self, record), fields(table = %self.table, user_id = %record.user_id))]
    async fn insert_if_absent(&self, record: &CloudRecord) -> SyncResult<bool> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "user_id")
            .append_pair("on_conflict", "user_id");

        let request = self
            .client
            .post(url)
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&UpsertBody::from(record));
        let rows: Vec<serde_json::Value> = self.rows(request).await?;

        debug!(inserted = rows.len(), "Insert if absent");
        Ok(!rows.is_empty())
    }
}

// =============================================================================
// Remote Store
// =============================================================================

/// [`RemoteStore`] that writes through a guarded update, so the record with
/// the newest `_localUpdatedAt` is the one that stays.
#[derive(Debug, Clone)]
pub struct PostgrestRemoteStore<T = PostgrestClient> {
    table: T,
}

impl PostgrestRemoteStore {
    /// Creates a store for `{url}/rest/v1/{table}`.
    pub fn new(
        url: &str,
        api_key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        Ok(Self::over(PostgrestClient::new(url, api_key, table, timeout)?))
    }

    /// Builds the store from the `[remote]` config section.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let url = config
            .remote_url()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is not set".into()))?;
        let api_key = config
            .remote
            .api_key
            .clone()
            .ok_or_else(|| SyncError::InvalidConfig("remote.api_key is not set".into()))?;

        Self::new(url, api_key, config.remote.table.clone(), config.request_timeout())
    }

    /// Authenticates requests as the signed-in user.
    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        Self::over(self.table.with_access_token(token))
    }
}

impl<T: RestTable> PostgrestRemoteStore<T> {
    pub fn over(table: T) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &T {
        &self.table
    }
}

#[async_trait]
impl<T: RestTable> RemoteStore for PostgrestRemoteStore<T> {
    async fn fetch(&self, user_id: &str) -> SyncResult<Option<CloudRecord>> {
        self.table.select(user_id).await
    }

    async fn upsert(&self, record: &CloudRecord) -> SyncResult<()> {
        let written_at = record.data.local_updated_at;

        if self.table.update_unless_newer(record, written_at).await? {
            debug!(local_updated_at = written_at, "Updated cloud record");
            return Ok(());
        }
        if self.table.insert_if_absent(record).await? {
            debug!(local_updated_at = written_at, "Created cloud record");
            return Ok(());
        }
        // Another device created the row between the two calls
        if self.table.update_unless_newer(record, written_at).await? {
            debug!(local_updated_at = written_at, "Updated cloud record");
        } else {
            debug!(local_updated_at = written_at, "Cloud record is newer, write skipped");
        }
        Ok(())
    }
}

// =============================================================================
// Wire Helpers
// =============================================================================

#[derive(Serialize)]
struct UpsertBody<'a> {
    user_id: &'a str,
    data: &'a SyncableData,
    data_version: u32,
}

impl<'a> From<&'a CloudRecord> for UpsertBody<'a> {
    fn from(record: &'a CloudRecord) -> Self {
        Self {
            user_id: &record.user_id,
            data: &record.data,
            data_version: record.data_version,
        }
    }
}

#[derive(Serialize)]
struct PatchBody<'a> {
    data: &'a SyncableData,
    data_version: u32,
}

impl<'a> From<&'a CloudRecord> for PatchBody<'a> {
    fn from(record: &'a CloudRecord) -> Self {
        Self {
            data: &record.data,
            data_version: record.data_version,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| SyncError::InvalidConfig("API key or token contains invalid header characters".into()))
}

/// Validates a project URL and returns its REST root without a trailing `/`.
pub fn normalize_rest_url(url: &str) -> SyncResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SyncError::InvalidUrl("remote URL must not be empty".into()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(SyncError::InvalidUrl(format!(
            "remote URL must include http:// or https://, got: {trimmed}"
        )));
    }
    Url::parse(trimmed)?;

    if trimmed.ends_with(REST_PATH) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/{REST_PATH}"))
    }
}

/// Extracts a readable message from a PostgREST/Supabase error body.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::Method::{GET, PATCH, POST};
    use httpmock::MockServer;
    use serde_json::json;
    use solace_core::StateMap;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// A table that evaluates requests the way PostgREST does: a PATCH only
    /// touches rows matching its filter, an ignore-duplicates insert never
    /// replaces an existing row.
    #[derive(Clone, Default)]
    pub(crate) struct PostgrestTable {
        rows: Arc<Mutex<HashMap<String, CloudRecord>>>,
    }

    impl PostgrestTable {
        pub(crate) fn row(&self, user_id: &str) -> Option<CloudRecord> {
            self.rows.lock().unwrap().get(user_id).cloned()
        }

        /// A plain `merge-duplicates` upsert: replaces whatever is stored.
        pub(crate) fn replace(&self, record: CloudRecord) {
            self.rows.lock().unwrap().insert(record.user_id.clone(), record);
        }
    }

    #[async_trait]
    impl RestTable for PostgrestTable {
        async fn select(&self, user_id: &str) -> SyncResult<Option<CloudRecord>> {
            Ok(self.row(user_id))
        }

        async fn update_unless_newer(&self, record: &CloudRecord, not_after: i64) -> SyncResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(&record.user_id) {
                Some(row) if row.data.local_updated_at <= not_after => {
                    row.data = record.data.clone();
                    row.data_version = record.data_version;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn insert_if_absent(&self, record: &CloudRecord) -> SyncResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&record.user_id) {
                return Ok(false);
            }
            rows.insert(record.user_id.clone(), record.clone());
            Ok(true)
        }
    }

    fn record(name: &str, local_updated_at: i64) -> CloudRecord {
        let mut fields = StateMap::new();
        fields.insert("profile".into(), json!({ "name": name }));
        CloudRecord::new("user-1", SyncableData { local_updated_at, fields }, 1)
    }

    #[test]
    fn normalize_rest_url_appends_rest_path() {
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
        assert_eq!(
            normalize_rest_url("https://demo.supabase.co/rest/v1").unwrap(),
            "https://demo.supabase.co/rest/v1"
        );
    }

    #[test]
    fn normalize_rest_url_rejects_bad_input() {
        assert!(normalize_rest_url("   ").is_err());
        assert!(normalize_rest_url("demo.supabase.co").is_err());
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        let body = r#"{"code":"42501","message":"permission denied for table user_data"}"#;
        assert_eq!(
            parse_api_error(StatusCode::FORBIDDEN, body),
            "permission denied for table user_data"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }

    #[test]
    fn rows_decode_into_cloud_records() {
        let body = r#"[{
            "user_id": "user-1",
            "data": { "_localUpdatedAt": 1700000000000, "profile": { "name": "Ada" } },
            "data_version": 1,
            "updated_at": "2024-01-01T10:00:00.123456+00:00"
        }]"#;
        let rows: Vec<CloudRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(rows[0].data.local_updated_at, 1_700_000_000_000);
        assert!(rows[0].updated_at.is_some());
    }

    #[test]
    fn write_bodies_have_no_server_columns() {
        let record = record("Ada", 5);

        let insert = serde_json::to_value(UpsertBody::from(&record)).unwrap();
        assert_eq!(insert["user_id"], "user-1");
        assert_eq!(insert["data"]["_localUpdatedAt"], 5);
        assert!(insert.get("updated_at").is_none());

        let patch = serde_json::to_value(PatchBody::from(&record)).unwrap();
        assert!(patch.get("user_id").is_none());
        assert_eq!(patch["data_version"], 1);
    }

    #[test]
    fn client_builds_table_url() {
        let client = PostgrestClient::new(
            "https://demo.supabase.co",
            "anon",
            "user_data",
            Duration::from_secs(15),
        )
        .unwrap();
        assert_eq!(
            client.table_url().unwrap().as_str(),
            "https://demo.supabase.co/rest/v1/user_data"
        );
        assert!(client.headers().unwrap().contains_key("apikey"));
    }

    #[tokio::test]
    async fn older_write_does_not_replace_newer_row() {
        let table = PostgrestTable::default();
        let store = PostgrestRemoteStore::over(table.clone());

        store.upsert(&record("newer", 3_000)).await.unwrap();
        store.upsert(&record("older", 2_500)).await.unwrap();

        let row = table.row("user-1").unwrap();
        assert_eq!(row.data.local_updated_at, 3_000);
        assert_eq!(row.data.fields["profile"], json!({ "name": "newer" }));

        store.upsert(&record("newest", 4_000)).await.unwrap();
        assert_eq!(table.row("user-1").unwrap().data.local_updated_at, 4_000);
    }

    #[tokio::test]
    async fn equal_timestamp_write_is_applied() {
        let table = PostgrestTable::default();
        table.replace(record("first", 3_000));
        let store = PostgrestRemoteStore::over(table.clone());

        store.upsert(&record("second", 3_000)).await.unwrap();
        assert_eq!(
            table.row("user-1").unwrap().data.fields["profile"],
            json!({ "name": "second" })
        );
    }

    #[tokio::test]
    async fn upsert_sends_guarded_patch_then_insert() {
        let server = MockServer::start_async().await;

        let patch = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/rest/v1/user_data")
                    .query_param("user_id", "eq.user-1")
                    .query_param("data->_localUpdatedAt", "lte.2500")
                    .header("apikey", "anon")
                    .header("prefer", "return=representation");
                then.status(200)
                    .header("content-type", "application/json")
                    .body("[]");
            })
            .await;
        let insert = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rest/v1/user_data")
                    .query_param("on_conflict", "user_id")
                    .header("prefer", "resolution=ignore-duplicates,return=representation");
                then.status(201)
                    .header("content-type", "application/json")
                    .body(r#"[{"user_id":"user-1"}]"#);
            })
            .await;

        let store = PostgrestRemoteStore::new(
            &server.base_url(),
            "anon",
            "user_data",
            Duration::from_secs(5),
        )
        .unwrap();
        store.upsert(&record("Ada", 2_500)).await.unwrap();

        patch.assert_async().await;
        insert.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_maps_api_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/user_data");
                then.status(401)
                    .header("content-type", "application/json")
                    .body(r#"{"message":"JWT expired"}"#);
            })
            .await;

        let store = PostgrestRemoteStore::new(
            &server.base_url(),
            "anon",
            "user_data",
            Duration::from_secs(5),
        )
        .unwrap();

        match store.fetch("user-1").await {
            Err(SyncError::RemoteApi { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "JWT expired");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }
}
