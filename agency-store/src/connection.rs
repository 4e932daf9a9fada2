use agency_core::agency::{AgencyError, Result};
use async_trait::async_trait;
use reqwest::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    redirect, Method, RequestBuilder,
};
use std::time::Duration;

/// Raw answer of one agency endpoint call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// `Location` header, set on redirects.
    pub location: Option<String>,
}

/// Executes a single request against one agency endpoint.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ConnResponse>;
}

/// Describes how a [`ReqwestConnection`] is created.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base address of an agent, e.g. `http://127.0.0.1:8531`.
    pub host: String,
    /// Value of the `Authorization` header, e.g. `bearer <jwt>`.
    pub auth: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReqwestConnection {
    http: reqwest::Client,
    host: String,
    auth: Option<String>,
}

impl ReqwestConnection {
    pub fn new(cfg: ConnectionConfig) -> Result<Self> {
        // Redirects point at the agency leader; they are reported, not followed.
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(100)
            .pool_idle_timeout(Duration::from_millis(100))
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| AgencyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            host: cfg.host.trim_end_matches('/').to_string(),
            auth: cfg.auth,
        })
    }

    fn request(&self, method: Method, endpoint: &str, body: Option<Vec<u8>>) -> RequestBuilder {
        let url = format!("{}{}", self.host, endpoint);
        let mut req = self.http.request(method, &url);
        if let Some(auth) = &self.auth {
            req = req.header(AUTHORIZATION, auth);
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }
        req
    }
}

#[async_trait]
impl Connection for ReqwestConnection {
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<ConnResponse> {
        let resp = self
            .request(method, endpoint, body)
            .send()
            .await
            .map_err(|e| AgencyError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .map_err(|e| AgencyError::Transport(e.to_string()))?;

        Ok(ConnResponse {
            status,
            body: body.to_vec(),
            location,
        })
    }
}
