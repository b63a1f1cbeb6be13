//! HTTP client implementation.
//!
//! Wraps a configured `reqwest::Client` and executes [`BuiltRequest`]s,
//! applying the request's auth scheme. Digest auth performs its
//! challenge-response round trip here; AWS requests are signed over the
//! final URL after query parameters are merged.

use rand::Rng;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use url::Url;

use super::auth;
use super::request::{BuiltBody, BuiltRequest, PartKind};
use super::response::HttpResponse;
use crate::error::{Error, Result};
use crate::spec::AuthConfig;

/// Client construction options.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Fallback timeout; built requests carry their own.
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// When false the client accepts invalid TLS certificates.
    pub validate_ssl: bool,
    /// Proxy URL applied to all requests.
    pub proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            follow_redirects: true,
            max_redirects: 10,
            validate_ssl: true,
            proxy: None,
        }
    }
}

/// HTTP client for executing built requests.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Creates a client honoring redirect, TLS, and proxy options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid proxy URL, or the
    /// underlying builder error.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        let redirect_policy = if options.follow_redirects {
            let max = options.max_redirects;
            // Stop without erroring once the hop budget is spent.
            Policy::custom(move |attempt| {
                if attempt.previous().len() > max {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            })
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(redirect_policy)
            .danger_accept_invalid_certs(!options.validate_ssl);

        if let Some(proxy) = &options.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("invalid proxy URL '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Executes a built request with its auth scheme applied.
    pub async fn execute(
        &self,
        request: &BuiltRequest,
        auth_config: Option<&AuthConfig>,
    ) -> Result<HttpResponse> {
        let start = Instant::now();

        let mut url = Url::parse(&request.url)
            .map_err(|e| Error::Execution(format!("invalid URL '{}': {e}", request.url)))?;
        for (key, value) in &request.query {
            url.query_pairs_mut().append_pair(key, value);
        }

        let mut extra_headers: Vec<(String, String)> = Vec::new();
        match auth_config {
            Some(AuthConfig::Basic { username, password }) => {
                extra_headers.push((
                    "Authorization".into(),
                    auth::basic_authorization(username, password),
                ));
            }
            Some(AuthConfig::Bearer { token }) => {
                extra_headers.push(("Authorization".into(), auth::bearer_authorization(token)));
            }
            Some(AuthConfig::ApiKey { header, value }) => {
                extra_headers.push((header.clone(), value.clone()));
            }
            Some(AuthConfig::ApiKeyQuery { name, value }) => {
                url.query_pairs_mut().append_pair(name, value);
            }
            Some(AuthConfig::OAuth2 {
                token_url,
                client_id,
                client_secret,
                username,
                password,
            }) => {
                let token = self
                    .fetch_oauth2_token(token_url, client_id, client_secret, username, password)
                    .await?;
                extra_headers.push(("Authorization".into(), auth::bearer_authorization(&token)));
            }
            Some(AuthConfig::Aws {
                access_key,
                secret_key,
                region,
                service,
            }) => {
                extra_headers.extend(auth::sign_aws_v4(
                    request.method.as_str(),
                    &url,
                    &request.body.signing_bytes(),
                    access_key,
                    secret_key,
                    region,
                    service,
                    chrono::Utc::now(),
                ));
            }
            Some(AuthConfig::Digest { .. }) | None => {}
        }

        let (mut status, mut headers, mut body) =
            self.send_raw(request, &url, &extra_headers).await?;

        // Digest: an unauthorized first response carrying a digest
        // challenge earns exactly one authenticated retry.
        if let Some(AuthConfig::Digest { username, password }) = auth_config {
            if status == StatusCode::UNAUTHORIZED {
                let challenge = headers
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok())
                    .and_then(auth::parse_digest_challenge);
                if let Some(challenge) = challenge {
                    let uri = match url.query() {
                        Some(q) => format!("{}?{q}", url.path()),
                        None => url.path().to_string(),
                    };
                    let cnonce = format!("{:08x}", rand::thread_rng().gen::<u32>());
                    if let Some(authorization) = auth::digest_authorization(
                        &challenge,
                        request.method.as_str(),
                        &uri,
                        username,
                        password,
                        &cnonce,
                    ) {
                        let mut retry_headers = extra_headers.clone();
                        retry_headers.push(("Authorization".into(), authorization));
                        (status, headers, body) =
                            self.send_raw(request, &url, &retry_headers).await?;
                    }
                }
            }
        }

        Ok(HttpResponse::new(status, headers, body, start.elapsed()))
    }

    async fn send_raw(
        &self,
        request: &BuiltRequest,
        url: &Url,
        extra_headers: &[(String, String)],
    ) -> Result<(StatusCode, HeaderMap, String)> {
        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .timeout(request.timeout);

        let has_content_type = request
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        for (name, value) in request.headers.iter().chain(extra_headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match &request.body {
            BuiltBody::None => {}
            BuiltBody::Text {
                content,
                content_type,
            } => {
                if let Some(content_type) = content_type {
                    if !has_content_type {
                        builder = builder.header("Content-Type", *content_type);
                    }
                }
                builder = builder.body(content.clone());
            }
            BuiltBody::Form(pairs) => {
                builder = builder.form(pairs);
            }
            BuiltBody::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    form = match &part.kind {
                        PartKind::Text(value) => form.text(part.name.clone(), value.clone()),
                        PartKind::File(path) => {
                            let bytes = tokio::fs::read(path).await?;
                            let file_name = path
                                .file_name()
                                .map(|n| n.to_string_lossy().into_owned())
                                .unwrap_or_else(|| "file".to_string());
                            form.part(
                                part.name.clone(),
                                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
                            )
                        }
                    };
                }
                builder = builder.multipart(form);
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok((status, headers, body))
    }

    /// Client-credentials grant, or password grant when a username and
    /// password are configured.
    async fn fetch_oauth2_token(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        username: &Option<String>,
        password: &Option<String>,
    ) -> Result<String> {
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        match (username, password) {
            (Some(user), Some(pass)) => {
                form.push(("grant_type", "password"));
                form.push(("username", user));
                form.push(("password", pass));
            }
            _ => form.push(("grant_type", "client_credentials")),
        }

        let response = self.client.post(token_url).form(&form).send().await?;
        let value: serde_json::Value = response.json().await?;
        value["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Execution(format!(
                    "OAuth2 token response from {token_url} has no access_token"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.follow_redirects);
        assert_eq!(options.max_redirects, 10);
        assert!(options.validate_ssl);
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let options = ClientOptions {
            proxy: Some("::not a url::".into()),
            ..ClientOptions::default()
        };
        let err = HttpClient::new(&options).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_client_builds_with_insecure_tls() {
        let options = ClientOptions {
            validate_ssl: false,
            follow_redirects: false,
            ..ClientOptions::default()
        };
        assert!(HttpClient::new(&options).is_ok());
    }
}
