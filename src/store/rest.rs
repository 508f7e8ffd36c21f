//! Firebase Realtime Database over its REST API, with Identity Toolkit
//! for email/password accounts.

use super::{normalize, AuthSession, PushKeyGenerator, Store, StorePath};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Mutex;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";

pub struct RestStore {
    client: reqwest::Client,
    database_url: String,
    identity_base: String,
    api_key: String,
    token: Mutex<Option<String>>,
    keys: PushKeyGenerator,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Identity { message: String },
    Database(String),
}

impl RestStore {
    pub fn new(database_url: &str, api_key: &str) -> Result<Self> {
        Self::with_identity_base(database_url, api_key, IDENTITY_BASE)
    }

    pub fn with_identity_base(database_url: &str, api_key: &str, identity_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("studygroupd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            database_url: database_url.trim_end_matches('/').to_string(),
            identity_base: identity_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            token: Mutex::new(None),
            keys: PushKeyGenerator::new(),
        })
    }

    fn node_url(&self, path: &StorePath) -> String {
        if path.is_root() {
            format!("{}/.json", self.database_url)
        } else {
            format!("{}/{}.json", self.database_url, path)
        }
    }

    fn token(&self) -> Option<String> {
        match self.token.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_token(&self, token: Option<String>) {
        match self.token.lock() {
            Ok(mut g) => *g = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token() {
            Some(t) => req.query(&[("auth", t)]),
            None => req,
        }
    }

    async fn identity_call(&self, endpoint: &str, email: &str, password: &str) -> Result<AuthSession> {
        let url = format!("{}/accounts:{}", self.identity_base, endpoint);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::identity_error(resp).await);
        }

        let body: IdentityResponse = resp.json().await?;
        self.set_token(Some(body.id_token.clone()));
        Ok(AuthSession {
            uid: body.local_id,
            email: body.email.unwrap_or_else(|| email.to_string()),
            id_token: Some(body.id_token),
        })
    }

    async fn identity_error(resp: reqwest::Response) -> AppError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        match parse_error(&text) {
            Some(msg) if status.is_client_error() => AppError::Auth(msg),
            Some(msg) => AppError::Transport(msg),
            None => AppError::Transport(format!("identity service returned {}", status)),
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let msg = parse_error(&text).unwrap_or_else(|| format!("database returned {}", status));
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Forbidden(msg),
            StatusCode::NOT_FOUND => AppError::NotFound(msg),
            s if s.is_client_error() => AppError::Validation(msg),
            _ => AppError::Transport(msg),
        })
    }
}

fn parse_error(text: &str) -> Option<String> {
    let env: ErrorEnvelope = serde_json::from_str(text).ok()?;
    Some(match env.error {
        ErrorBody::Identity { message } => message,
        ErrorBody::Database(m) => m,
    })
}

#[async_trait]
impl Store for RestStore {
    fn backend_name(&self) -> &'static str {
        "firebase"
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.identity_call("signUp", email.trim(), password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.identity_call("signInWithPassword", email.trim(), password)
            .await
    }

    fn sign_out(&self) {
        self.set_token(None);
    }

    async fn delete_account(&self, account: &AuthSession) -> Result<()> {
        let Some(id_token) = &account.id_token else {
            return Err(AppError::Auth("MISSING_ID_TOKEN".into()));
        };
        let url = format!("{}/accounts:delete", self.identity_base);
        let resp = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::identity_error(resp).await);
        }
        if self.token().as_deref() == Some(id_token.as_str()) {
            self.set_token(None);
        }
        Ok(())
    }

    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        let req = self.with_auth(self.client.get(self.node_url(path)));
        let resp = Self::check(req.send().await?).await?;
        let value: Value = resp.json().await?;
        Ok(normalize(&value))
    }

    async fn set(&self, path: &StorePath, value: &Value) -> Result<()> {
        let Some(value) = normalize(value) else {
            return self.remove(path).await;
        };
        let req = self
            .with_auth(self.client.put(self.node_url(path)))
            .query(&[("print", "silent")])
            .json(&value);
        Self::check(req.send().await?).await?;
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<()> {
        let req = self.with_auth(self.client.delete(self.node_url(path)));
        Self::check(req.send().await?).await?;
        Ok(())
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }
}
