//! Client for the remote authentication/authorization service.
//!
//! Both calls POST a JSON document and look only at the status code:
//! `200 OK` accepts, anything else rejects. Transport failures are reported
//! as errors so the caller can log them, and are otherwise treated as a
//! rejection. Nothing is retried or cached.

use std::time::Duration;

use async_trait::async_trait;
use gitgate_common::{AuthConfig, GitgateError};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::*;
use url::Url;

pub const AUTHENTICATION_ENDPOINT: &str = "api/authentication";
pub const AUTHORIZATION_ENDPOINT: &str = "api/authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Accepted,
    Rejected,
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        *self == Self::Accepted
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthClientError {
    #[error("authorization service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Config(#[from] GitgateError),
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Decides whether `public_key` (base64 wire encoding) may open a session at all.
    async fn authenticate(&self, public_key: &str) -> Result<AuthDecision, AuthClientError>;

    /// Decides whether `public_key` may access `repository`.
    async fn authorize(
        &self,
        public_key: &str,
        repository: &str,
    ) -> Result<AuthDecision, AuthClientError>;
}

/// Reduces a repository argument to the project name the service knows:
/// single quotes removed, trailing `.git` dropped.
pub fn project_name(repository: &str) -> String {
    let repository = repository.replace('\'', "");
    match repository.strip_suffix(".git") {
        Some(name) => name.to_owned(),
        None => repository,
    }
}

#[derive(Serialize)]
struct KeyPayload<'a> {
    key: &'a str,
}

#[derive(Serialize)]
struct ProjectPayload<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct AuthenticationRequest<'a> {
    key: KeyPayload<'a>,
}

#[derive(Serialize)]
struct AuthorizationRequest<'a> {
    key: KeyPayload<'a>,
    project: ProjectPayload<'a>,
}

pub struct HttpAuthClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAuthClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthClientError> {
        Self::with_base_url(config.base_url()?, config.timeout)
    }

    pub fn with_base_url(base_url: Url, timeout: Duration) -> Result<Self, AuthClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<AuthDecision, AuthClientError> {
        let url = self.base_url.join(endpoint)?;
        let response = self.client.post(url.clone()).json(body).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            debug!(%url, "Accepted");
            Ok(AuthDecision::Accepted)
        } else {
            info!(%url, %status, "Rejected");
            Ok(AuthDecision::Rejected)
        }
    }
}

#[async_trait]
impl AuthService for HttpAuthClient {
    async fn authenticate(&self, public_key: &str) -> Result<AuthDecision, AuthClientError> {
        self.post(
            AUTHENTICATION_ENDPOINT,
            &AuthenticationRequest {
                key: KeyPayload { key: public_key },
            },
        )
        .await
    }

    async fn authorize(
        &self,
        public_key: &str,
        repository: &str,
    ) -> Result<AuthDecision, AuthClientError> {
        let name = project_name(repository);
        self.post(
            AUTHORIZATION_ENDPOINT,
            &AuthorizationRequest {
                key: KeyPayload { key: public_key },
                project: ProjectPayload { name: &name },
            },
        )
        .await
    }
}
