//! HTTP request/upload capability and protocol URL construction.
//!
//! Everything above this layer talks to the service through [`HttpTransport`],
//! which keeps the resource clients testable without a network.

use crate::{
    config::ClientConfig,
    error::{Error, Result},
};
use async_trait::async_trait;
use reqwest::{Method, Url, header::CONTENT_TYPE, multipart};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The family of protocol a URL is built for.
///
/// The secure variant is used unless the client is configured for plain HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
}

impl Protocol {
    fn scheme(self, plain: bool) -> &'static str {
        match (self, plain) {
            (Protocol::Http, false) => "https",
            (Protocol::Http, true) => "http",
            (Protocol::WebSocket, false) => "wss",
            (Protocol::WebSocket, true) => "ws",
        }
    }
}

/// Builds `{scheme}://{base}/{path}?{query}` for the configured host.
pub fn build_url(
    config: &ClientConfig,
    protocol: Protocol,
    path: &str,
    query: &[(String, String)],
) -> Result<String> {
    let raw = format!(
        "{}://{}/{}",
        protocol.scheme(config.base_http),
        config.base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let mut url = Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{raw}: {e}")))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

/// Like [`build_url`], additionally injecting credentials as a query
/// parameter: `jwt_token` when one is configured, `api_key` otherwise.
pub fn build_auth_url(
    config: &ClientConfig,
    protocol: Protocol,
    path: &str,
    query: &[(String, String)],
) -> Result<String> {
    let mut query = query.to_vec();
    if let Some(token) = config.jwt_token() {
        query.push(("jwt_token".to_string(), token.to_string()));
    } else if let Some(key) = config.api_key() {
        query.push(("api_key".to_string(), key.to_string()));
    }
    build_url(config, protocol, path, &query)
}

/// A JSON request against the REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// One file attached to a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// A multipart upload against the REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub parts: Vec<FilePart>,
}

impl UploadRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            parts: Vec::new(),
        }
    }

    /// Adds a query value, skipping it when absent.
    pub fn with_query(mut self, key: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_string(), value));
        }
        self
    }

    pub fn with_part(mut self, part: FilePart) -> Self {
        self.parts.push(part);
        self
    }
}

/// The generic HTTP capability consumed by the resource clients.
///
/// Both calls resolve to `None` when the response body is not JSON.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<Option<Value>>;
    async fn upload(&self, request: UploadRequest) -> Result<Option<Value>>;
}

/// [`HttpTransport`] backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl ReqwestTransport {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn rest_url(&self, path: &str, query: &[(String, String)]) -> Result<String> {
        // Browser-style credentials travel in the query string.
        if self.config.api_key().is_none() {
            build_auth_url(&self.config, Protocol::Http, path, query)
        } else {
            build_url(&self.config, Protocol::Http, path, query)
        }
    }

    fn with_api_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key() {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn request(&self, request: ApiRequest) -> Result<Option<Value>> {
        let url = self.rest_url(&request.path, &request.query)?;
        debug!(method = %request.method, path = %request.path, "Sending API request");

        let mut builder = self
            .with_api_key(self.client.request(request.method, url))
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        Ok(read_json(response).await)
    }

    async fn upload(&self, request: UploadRequest) -> Result<Option<Value>> {
        let url = self.rest_url(&request.path, &request.query)?;
        debug!(
            method = %request.method,
            path = %request.path,
            parts = request.parts.len(),
            "Sending multipart upload"
        );

        let mut form = multipart::Form::new();
        for part in request.parts {
            let file = multipart::Part::bytes(part.bytes)
                .file_name(part.file_name)
                .mime_str(&part.mime)?;
            form = form.part(part.field, file);
        }

        let response = self
            .with_api_key(self.client.request(request.method, url))
            .multipart(form)
            .send()
            .await?;
        Ok(read_json(response).await)
    }
}

async fn read_json(response: reqwest::Response) -> Option<Value> {
    let status = response.status();
    match response.json::<Value>().await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(%status, error = %e, "Response body is not valid JSON");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(base_http: bool, api_key: Option<&str>, jwt: Option<&str>) -> ClientConfig {
        ClientConfig {
            base_url: "api.example.com".into(),
            api_key: api_key.map(|k| SecretString::from(k.to_string())),
            jwt_token: jwt.map(|t| SecretString::from(t.to_string())),
            base_http,
        }
    }

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_url_schemes() {
        let secure = config(false, Some("key"), None);
        let plain = config(true, Some("key"), None);

        assert_eq!(
            build_url(&secure, Protocol::Http, "voices", &[]).unwrap(),
            "https://api.example.com/voices"
        );
        assert_eq!(
            build_url(&plain, Protocol::Http, "voices", &[]).unwrap(),
            "http://api.example.com/voices"
        );
        assert_eq!(
            build_url(&secure, Protocol::WebSocket, "speak/en", &[]).unwrap(),
            "wss://api.example.com/speak/en"
        );
        assert_eq!(
            build_url(&plain, Protocol::WebSocket, "/speak/en", &[]).unwrap(),
            "ws://api.example.com/speak/en"
        );
    }

    #[test]
    fn test_build_url_encodes_query() {
        let cfg = config(false, Some("key"), None);
        let url = build_url(
            &cfg,
            Protocol::Http,
            "voices",
            &q(&[("voice_name", "My Voice"), ("voice_tags", "a, b")]),
        )
        .unwrap();
        assert_eq!(
            url,
            "https://api.example.com/voices?voice_name=My+Voice&voice_tags=a%2C+b"
        );
    }

    #[test]
    fn test_build_auth_url_prefers_jwt() {
        let both = config(false, Some("key"), Some("token"));
        let url = build_auth_url(&both, Protocol::WebSocket, "agents", &[]).unwrap();
        assert_eq!(url, "wss://api.example.com/agents?jwt_token=token");

        let key_only = config(false, Some("key"), None);
        let url = build_auth_url(&key_only, Protocol::WebSocket, "speak/en", &[]).unwrap();
        assert_eq!(url, "wss://api.example.com/speak/en?api_key=key");
    }

    #[test]
    fn test_build_url_rejects_garbage_host() {
        let mut cfg = config(false, Some("key"), None);
        cfg.base_url = "bad host".into();
        assert!(matches!(
            build_url(&cfg, Protocol::Http, "voices", &[]),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_upload_request_skips_absent_query() {
        let request = UploadRequest::new(Method::POST, "voices")
            .with_query("voice_name", Some("Name".into()))
            .with_query("voice_tags", None);
        assert_eq!(request.query, q(&[("voice_name", "Name")]));
    }

    #[test]
    fn test_rest_url_uses_jwt_without_api_key() {
        let transport =
            ReqwestTransport::new(Arc::new(config(false, None, Some("token")))).unwrap();
        assert_eq!(
            transport.rest_url("agents", &[]).unwrap(),
            "https://api.example.com/agents?jwt_token=token"
        );

        let transport = ReqwestTransport::new(Arc::new(config(false, Some("key"), None))).unwrap();
        assert_eq!(
            transport.rest_url("agents", &[]).unwrap(),
            "https://api.example.com/agents"
        );
    }
}
