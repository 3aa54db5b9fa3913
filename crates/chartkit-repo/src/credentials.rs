//! Credential handling with redirect protection
//!
//! - Credentials are scoped to URL prefixes
//! - Credentials are never sent after a cross-origin redirect
//! - TLS settings come from the repository entry

use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

use crate::error::{RepoError, Result};

const MAX_REDIRECTS: u32 = 10;

/// Basic auth credentials from a repository entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value
    pub fn auth_header(&self) -> String {
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            format!("{}:{}", self.username, self.password),
        );
        format!("Basic {}", encoded)
    }
}

/// Scoped credentials - maps URL prefixes to credentials
#[derive(Debug, Clone, Default)]
pub struct ScopedCredentials {
    scopes: HashMap<String, Credentials>,
}

impl ScopedCredentials {
    /// Add credentials for a URL scope
    pub fn add(&mut self, url_prefix: &str, credentials: Credentials) {
        let prefix = url_prefix.trim_end_matches('/').to_string();
        self.scopes.insert(prefix, credentials);
    }

    /// Get credentials for a URL (by longest matching prefix)
    pub fn for_url(&self, url: &str) -> Option<&Credentials> {
        self.scopes
            .iter()
            .filter(|(prefix, _)| url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, creds)| creds)
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Check if two URLs are same-origin
    pub fn same_origin(url1: &str, url2: &str) -> bool {
        match (Url::parse(url1), Url::parse(url2)) {
            (Ok(u1), Ok(u2)) => {
                u1.scheme() == u2.scheme()
                    && u1.host() == u2.host()
                    && u1.port_or_known_default() == u2.port_or_known_default()
            }
            _ => false,
        }
    }
}

/// TLS settings for a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Extra CA bundle (PEM)
    pub ca_file: Option<PathBuf>,
    /// Client certificate (PEM), used together with `key_file`
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure_skip_tls_verify: bool,
}

/// HTTP client that follows redirects itself so credentials never leak
/// to another origin
pub struct SecureHttpClient {
    client: reqwest::Client,
    credentials: ScopedCredentials,
}

impl SecureHttpClient {
    pub fn new(credentials: ScopedCredentials) -> Result<Self> {
        Self::with_tls(credentials, &TlsOptions::default())
    }

    pub fn with_tls(credentials: ScopedCredentials, tls: &TlsOptions) -> Result<Self> {
        // Redirects are followed manually in `get`; no request timeout is set
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());

        if let Some(ca_file) = &tls.ca_file {
            let pem = std::fs::read(ca_file)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| RepoError::InvalidConfig {
                message: format!("invalid CA file {}: {}", ca_file.display(), e),
            })?;
            builder = builder.add_root_certificate(cert);
        }

        if let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) {
            let mut pem = std::fs::read(key_file)?;
            pem.extend(std::fs::read(cert_file)?);
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| RepoError::InvalidConfig {
                message: format!("invalid client certificate {}: {}", cert_file.display(), e),
            })?;
            builder = builder.identity(identity);
        }

        if tls.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
        })
    }

    /// Fetch a URL, following redirects
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let original_url = url.to_string();
        let mut current_url = original_url.clone();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if ScopedCredentials::same_origin(&original_url, &current_url) {
                if let Some(creds) = self.credentials.for_url(&current_url) {
                    request = request.header(reqwest::header::AUTHORIZATION, creds.auth_header());
                }
            } else if self.credentials.for_url(&original_url).is_some() {
                tracing::warn!(
                    "Cross-origin redirect from {} to {} - credentials not forwarded",
                    original_url,
                    current_url
                );
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(RepoError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| RepoError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(RepoError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(RepoError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if !status.is_success() {
                return Err(RepoError::HttpError {
                    status: status.as_u16(),
                    message: format!("failed to fetch {}", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await.map_err(|e| RepoError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_origin() {
        assert!(ScopedCredentials::same_origin(
            "https://example.com/foo",
            "https://example.com/bar"
        ));
        assert!(ScopedCredentials::same_origin(
            "https://example.com:443/foo",
            "https://example.com/bar"
        ));
        assert!(!ScopedCredentials::same_origin(
            "https://example.com/foo",
            "https://other.com/bar"
        ));
        assert!(!ScopedCredentials::same_origin(
            "https://example.com/foo",
            "http://example.com/bar"
        ));
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut scoped = ScopedCredentials::default();
        scoped.add("https://charts.example.com/", Credentials::basic("outer", "secret"));
        scoped.add("https://charts.example.com/team", Credentials::basic("inner", "secret"));

        assert_eq!(
            scoped.for_url("https://charts.example.com/team/index.yaml"),
            Some(&Credentials::basic("inner", "secret"))
        );
        assert_eq!(
            scoped.for_url("https://charts.example.com/index.yaml"),
            Some(&Credentials::basic("outer", "secret"))
        );
        assert!(scoped.for_url("https://public.example.com/index.yaml").is_none());
    }

    #[test]
    fn test_auth_header() {
        assert_eq!(
            Credentials::basic("user", "pass").auth_header(),
            "Basic dXNlcjpwYXNz"
        );
    }

    #[tokio::test]
    async fn test_credentials_dropped_on_cross_origin_redirect() {
        use wiremock::matchers::{header, header_exists, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let origin = MockServer::start().await;
        let other = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/moved.yaml", other.uri()).as_str()),
            )
            .mount(&origin)
            .await;

        Mock::given(method("GET"))
            .and(path("/moved.yaml"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&other)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&other)
            .await;

        let mut scoped = ScopedCredentials::default();
        scoped.add(&origin.uri(), Credentials::basic("user", "pass"));
        let client = SecureHttpClient::new(scoped).unwrap();

        let body = client
            .get_bytes(&format!("{}/index.yaml", origin.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }
}
