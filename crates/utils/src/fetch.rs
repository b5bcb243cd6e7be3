use std::{path::Path, time::Duration};

use tracing::{debug, warn};

use crate::{MailError, MailResult};

/// Raw content of a resolved resource together with its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Final path segment of the location, query string excluded.
    pub name: String,
    pub content: Vec<u8>,
}

/// Resolves local paths and `http(s)` URLs into [`Resource`] values.
///
/// Remote fetches are bounded by the configured timeout. A failed fetch, a
/// missing file and an empty resource all surface as the same
/// [`MailError::Attach`] error, the actual cause is only logged.
#[derive(Debug, Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
}

impl ResourceFetcher {
    pub fn new(timeout: Duration) -> MailResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(MailError::transport)?;
        Ok(Self { client })
    }

    /// Fetches the resource at `location`.
    pub async fn fetch(&self, location: &str) -> MailResult<Resource> {
        let (name, content) = if is_remote(location) {
            (url_name(location), self.fetch_remote(location).await)
        } else {
            (path_name(location), read_local(location).await)
        };
        if content.is_empty() {
            return Err(MailError::Attach(location.to_string()));
        }
        debug!(
            location = %location,
            name = %name,
            size = content.len(),
            "Resolved resource"
        );
        Ok(Resource { name, content })
    }

    async fn fetch_remote(&self, url: &str) -> Vec<u8> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(url = %url, error = %error, "Failed to fetch resource");
                return Vec::new();
            }
        };
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Resource fetched with error status");
        }
        match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => {
                warn!(url = %url, "Fetched resource is empty");
                Vec::new()
            }
            Ok(bytes) => bytes.to_vec(),
            Err(error) => {
                warn!(url = %url, error = %error, "Failed to read resource body");
                Vec::new()
            }
        }
    }
}

async fn read_local(path: &str) -> Vec<u8> {
    match tokio::fs::read(path).await {
        Ok(content) => {
            if content.is_empty() {
                warn!(path = %path, "Local resource is empty");
            }
            content
        }
        Err(error) => {
            warn!(path = %path, error = %error, "Failed to read resource");
            Vec::new()
        }
    }
}

/// Tells remote locations apart from local paths.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http")
}

/// Name of a remote resource, the last URL segment without query string.
pub fn url_name(url: &str) -> String {
    let path = url.split('?').next().unwrap_or(url);
    path_name(path)
}

/// Name of a local resource, the last path segment.
pub fn path_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Splits a file name into its stem, dropping the last extension.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(index) => &name[..index],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    fn fetcher() -> ResourceFetcher {
        ResourceFetcher::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_resource_names() {
        assert_eq!(url_name("https://cdn.example.com/img/logo.png?v=3&x=y"), "logo.png");
        assert_eq!(url_name("http://example.com/style.css"), "style.css");
        assert_eq!(path_name("assets/images/banner.jpg"), "banner.jpg");
        assert_eq!(path_name("report.pdf"), "report.pdf");
        assert!(is_remote("https://example.com/a.png"));
        assert!(!is_remote("images/a.png"));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("logo.png"), "logo");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_stem("README"), "README");
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4 content").unwrap();
        let location = file.path().to_string_lossy().into_owned();

        let resource = fetcher().fetch(&location).await.unwrap();
        assert_eq!(resource.content, b"%PDF-1.4 content");
        assert_eq!(
            resource.name,
            file.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let error = fetcher().fetch("logo.png").await.unwrap_err();
        assert_eq!(error.to_string(), "cannot attach \"logo.png\"");
    }

    #[tokio::test]
    async fn test_fetch_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        std::fs::write(&path, b"").unwrap();
        let location = path.to_string_lossy().into_owned();

        let error = fetcher().fetch(&location).await.unwrap_err();
        assert!(matches!(error, MailError::Attach(ref value) if value == &location));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_url() {
        let error = fetcher()
            .fetch("http://127.0.0.1:9/missing.png")
            .await
            .unwrap_err();
        assert!(matches!(error, MailError::Attach(_)));
    }
}
