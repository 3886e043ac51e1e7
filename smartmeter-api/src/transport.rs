//! HTTP transport used by the authenticator and the request dispatcher.
//!
//! Everything above this module talks to [`HttpTransport`] only, so a caller
//! can hand in their own connection handling (pooling, proxies, a shared
//! cookie jar) or a fake for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::cookie::Jar;
use serde::de::DeserializeOwned;

use crate::error::{Result, SmartmeterError};

/// Body of an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Only the login page fetch follows redirects.
    pub follow_redirects: bool,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            follow_redirects: false,
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = Some(RequestBody::Form(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ));
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            SmartmeterError::Deserialize(format!("{e} (status {})", self.status))
        })
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).send(request).await
    }
}

/// `reqwest`-backed transport.
///
/// Holds two clients over one cookie jar: the login form is only accepted
/// with the session cookies set while fetching it, but the credential POST
/// must not follow the redirect that carries the authorization code.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: reqwest::Client,
    non_following: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let following = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        let non_following = reqwest::Client::builder()
            .cookie_provider(jar)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::from_clients(following, non_following))
    }

    /// Use caller-owned clients. `non_following` must have redirects disabled,
    /// and both should share a cookie store.
    pub fn from_clients(following: reqwest::Client, non_following: reqwest::Client) -> Self {
        Self {
            following,
            non_following,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = if request.follow_redirects {
            &self.following
        } else {
            &self.non_following
        };

        let mut builder = client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            Some(RequestBody::Json(body)) => builder.json(&body),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                SmartmeterError::Timeout {
                    url: request.url.clone(),
                    timeout: request.timeout.unwrap_or_default(),
                }
            } else {
                SmartmeterError::Http(e)
            }
        };

        let resp = builder.send().await.map_err(timed_out)?;
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.text().await.map_err(timed_out)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
