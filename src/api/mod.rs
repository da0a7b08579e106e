use crate::models::{
    ClaimResult, ClaimUsernameRequest, CreateEntryRequest, CreateEntryResponse, Entry,
    UpdateEntryRequest,
};
use crate::store::RecordStore;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub(crate) enum ApiErrorKind {
    Network,
    Http,
    Parse,
    NotFound,
}

#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub(crate) struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        }
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: e.to_string(),
        }
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::NotFound,
            message: format!("{what} not found"),
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: "store unreachable".to_string(),
        }
    }

    fn http(status: reqwest::StatusCode, body: String, ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            message: format!("{ctx} ({status}): {body}"),
        }
    }
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// JSON/HTTP record store.
#[derive(Clone, Debug)]
pub(crate) struct ApiClient {
    pub(crate) base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn entry_path(id: &str) -> String {
        format!("/entries/{}", urlencoding::encode(id))
    }

    fn vote_path(entry_id: &str, username: &str) -> String {
        format!(
            "/entries/{}/votes/{}",
            urlencoding::encode(entry_id),
            urlencoding::encode(username)
        )
    }

    async fn send(&self, req: reqwest::RequestBuilder, ctx: &str) -> ApiResult<reqwest::Response> {
        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(ApiError::not_found(ctx))
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status, body, ctx))
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        ctx: &str,
    ) -> ApiResult<T> {
        self.send(req, ctx).await?.json().await.map_err(ApiError::parse)
    }
}

#[async_trait(?Send)]
impl RecordStore for ApiClient {
    async fn create_entry(&self, text: &str, username: &str) -> ApiResult<String> {
        let req = reqwest::Client::new()
            .post(self.url("/entries"))
            .json(&CreateEntryRequest {
                text: text.to_string(),
                username: username.to_string(),
            });
        let created: CreateEntryResponse = self.send_json(req, "create entry").await?;
        if created.id.trim().is_empty() {
            return Err(ApiError::parse("create entry response is missing id"));
        }
        Ok(created.id)
    }

    async fn update_entry(&self, id: &str, text: &str, username: &str) -> ApiResult<()> {
        let req = reqwest::Client::new()
            .put(self.url(&Self::entry_path(id)))
            .json(&UpdateEntryRequest {
                text: text.to_string(),
                username: username.to_string(),
            });
        self.send(req, "update entry").await.map(|_| ())
    }

    async fn delete_entry(&self, id: &str) -> ApiResult<()> {
        let req = reqwest::Client::new().delete(self.url(&Self::entry_path(id)));
        self.send(req, "delete entry").await.map(|_| ())
    }

    async fn list_entries(&self) -> ApiResult<Vec<Entry>> {
        let req = reqwest::Client::new().get(self.url("/entries"));
        self.send_json(req, "list entries").await
    }

    async fn get_entry(&self, id: &str) -> ApiResult<Option<Entry>> {
        let req = reqwest::Client::new().get(self.url(&Self::entry_path(id)));
        match self.send_json(req, "entry").await {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.kind == ApiErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_vote(&self, entry_id: &str, username: &str, voting: bool) -> ApiResult<()> {
        let client = reqwest::Client::new();
        let url = self.url(&Self::vote_path(entry_id, username));
        let req = if voting { client.put(url) } else { client.delete(url) };
        self.send(req, "vote").await.map(|_| ())
    }

    async fn claim_username(&self, target: &str, previous: &str) -> ApiResult<ClaimResult> {
        let req = reqwest::Client::new()
            .post(self.url("/users/claim"))
            .json(&ClaimUsernameRequest {
                username: target.to_string(),
                previous_username: previous.to_string(),
            });
        self.send_json(req, "claim username").await
    }
}
