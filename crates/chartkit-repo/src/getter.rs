//! Scheme-dispatched content getters
//!
//! A getter fetches the bytes behind a URL. `http`/`https` go through
//! [`SecureHttpClient`]; `file` reads from the local filesystem.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::config::Repository;
use crate::credentials::{ScopedCredentials, SecureHttpClient, TlsOptions};
use crate::error::{RepoError, Result};

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct GetterOptions {
    pub credentials: ScopedCredentials,
    pub tls: TlsOptions,
}

impl GetterOptions {
    /// Options for fetching `target` on behalf of `repo`
    pub fn for_repository(repo: &Repository, target: &str) -> Self {
        Self {
            credentials: repo.scoped_credentials(target),
            tls: repo.tls_options(),
        }
    }
}

/// Fetches content for a set of URL schemes
#[async_trait]
pub trait Getter: Send + Sync {
    /// Schemes this getter handles
    fn schemes(&self) -> &[&'static str];

    async fn get(&self, url: &Url, options: &GetterOptions) -> Result<Vec<u8>>;
}

/// HTTP(S) getter
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpGetter;

#[async_trait]
impl Getter for HttpGetter {
    fn schemes(&self) -> &[&'static str] {
        &["http", "https"]
    }

    async fn get(&self, url: &Url, options: &GetterOptions) -> Result<Vec<u8>> {
        let client = SecureHttpClient::with_tls(options.credentials.clone(), &options.tls)?;
        client.get_bytes(url.as_str()).await
    }
}

/// Local file getter
#[derive(Debug, Default, Clone, Copy)]
pub struct FileGetter;

#[async_trait]
impl Getter for FileGetter {
    fn schemes(&self) -> &[&'static str] {
        &["file"]
    }

    async fn get(&self, url: &Url, _options: &GetterOptions) -> Result<Vec<u8>> {
        let path = url
            .to_file_path()
            .map_err(|_| RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "not a local file path".to_string(),
            })?;
        Ok(tokio::fs::read(&path).await?)
    }
}

/// The set of getters available to an operation
#[derive(Clone)]
pub struct Getters {
    getters: Vec<Arc<dyn Getter>>,
}

impl Getters {
    /// Every built-in getter
    pub fn all() -> Self {
        Self {
            getters: vec![Arc::new(HttpGetter), Arc::new(FileGetter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            getters: Vec::new(),
        }
    }

    /// Register a getter; it takes precedence over earlier ones for its schemes
    pub fn register(&mut self, getter: Arc<dyn Getter>) {
        self.getters.insert(0, getter);
    }

    /// Find the getter for a scheme
    pub fn for_scheme(&self, scheme: &str) -> Result<&dyn Getter> {
        self.getters
            .iter()
            .find(|g| g.schemes().contains(&scheme))
            .map(|g| g.as_ref())
            .ok_or_else(|| RepoError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })
    }

    /// Fetch `url` with the getter matching its scheme
    pub async fn fetch(&self, url: &Url, options: &GetterOptions) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, "fetching");
        self.for_scheme(url.scheme())?.get(url, options).await
    }
}

impl Default for Getters {
    fn default() -> Self {
        Self::all()
    }
}

impl std::fmt::Debug for Getters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let schemes: Vec<&str> = self
            .getters
            .iter()
            .flat_map(|g| g.schemes().iter().copied())
            .collect();
        f.debug_struct("Getters").field("schemes", &schemes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_for_scheme() {
        let getters = Getters::all();
        assert!(getters.for_scheme("https").is_ok());
        assert!(getters.for_scheme("http").is_ok());
        assert!(getters.for_scheme("file").is_ok());

        let err = getters.for_scheme("oci").err().unwrap();
        assert!(matches!(err, RepoError::UnsupportedScheme { .. }));
        assert!(Getters::empty().for_scheme("https").is_err());
    }

    #[tokio::test]
    async fn test_file_getter() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.yaml");
        std::fs::write(&path, "apiVersion: v1\n").unwrap();

        let url = Url::from_file_path(&path).unwrap();
        let data = Getters::all()
            .fetch(&url, &GetterOptions::default())
            .await
            .unwrap();
        assert_eq!(data, b"apiVersion: v1\n");
    }

    #[tokio::test]
    async fn test_http_getter() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/charts/app-1.0.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"archive".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.tgz"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let getters = Getters::all();
        let ok = Url::parse(&format!("{}/charts/app-1.0.0.tgz", server.uri())).unwrap();
        assert_eq!(
            getters.fetch(&ok, &GetterOptions::default()).await.unwrap(),
            b"archive"
        );

        let missing = Url::parse(&format!("{}/missing.tgz", server.uri())).unwrap();
        let err = getters
            .fetch(&missing, &GetterOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::HttpError { status: 404, .. }));
    }
}
