use std::time::Duration;

use genimg_contracts::config::RemoteTarget;
use reqwest::blocking::multipart::{Form as MultipartForm, Part as MultipartPart};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use url::Url;

use crate::delivery::ImageStore;
use crate::error::DeliveryError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const UPLOAD_CONTENT_TYPE: &str = "image/png";
const AUTH_QUERY_KEY: &str = "authCode";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Deserialize)]
struct UploadedFile {
    src: String,
}

/// Client for the image host: one multipart POST per image, no retries.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    target: RemoteTarget,
    http: HttpClient,
}

impl RemoteStore {
    pub fn new(target: RemoteTarget) -> Result<Self, DeliveryError> {
        let http = HttpClient::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(transport_error)?;
        Ok(Self::with_http_client(target, http))
    }

    pub fn with_http_client(target: RemoteTarget, http: HttpClient) -> Self {
        Self { target, http }
    }

    pub fn target(&self) -> &RemoteTarget {
        &self.target
    }

    /// Endpoint with the auth token appended to whatever query it already has.
    pub fn upload_url(&self) -> Url {
        let mut url = self.target.endpoint.clone();
        url.query_pairs_mut()
            .append_pair(AUTH_QUERY_KEY, &self.target.token);
        url
    }

    pub fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, DeliveryError> {
        image::load_from_memory(bytes).map_err(DeliveryError::Decode)?;
        let part = MultipartPart::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str(UPLOAD_CONTENT_TYPE)
            .map_err(transport_error)?;
        let form = MultipartForm::new().part("file", part);

        tracing::debug!(endpoint = %self.target.endpoint, filename, "uploading image");
        let response = self
            .http
            .post(self.upload_url())
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().map_err(transport_error)?;
        if !status.is_success() {
            return Err(DeliveryError::UploadStatus {
                status: status.as_u16(),
                body: truncate_text(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let src = parse_upload_response(&body)?;
        let url = resolve_public_url(&self.target.endpoint, &src)?;
        tracing::info!(url = %url, "image uploaded");
        Ok(url.to_string())
    }
}

impl ImageStore for RemoteStore {
    fn name(&self) -> &str {
        "remote"
    }

    fn store(&self, bytes: &[u8], filename: &str) -> Result<String, DeliveryError> {
        self.upload(bytes, filename)
    }
}

/// Expects `[{"src": "/path"}, ...]` and returns the first `src`.
fn parse_upload_response(body: &str) -> Result<String, DeliveryError> {
    let files: Vec<UploadedFile> = serde_json::from_str(body).map_err(|err| {
        DeliveryError::UploadShape(format!(
            "expected a JSON array of objects with 'src' ({err}): {}",
            truncate_text(body, MAX_ERROR_BODY_CHARS)
        ))
    })?;
    let Some(first) = files.into_iter().next() else {
        return Err(DeliveryError::UploadShape(
            "response array was empty".to_string(),
        ));
    };
    let src = first.src.trim();
    if src.is_empty() {
        return Err(DeliveryError::UploadShape("'src' was empty".to_string()));
    }
    Ok(src.to_string())
}

// The request URL carries the auth token.
fn transport_error(err: reqwest::Error) -> DeliveryError {
    DeliveryError::UploadTransport(err.without_url())
}

/// Join `src` against the scheme+host of the upload endpoint, dropping any
/// credentials. A full `http(s)://` URL is taken as is; a scheme-relative
/// `//host/...` is rejected.
fn resolve_public_url(endpoint: &Url, src: &str) -> Result<Url, DeliveryError> {
    let mut origin = endpoint.clone();
    let _ = origin.set_username("");
    let _ = origin.set_password(None);
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    let joined = origin
        .join(src)
        .map_err(|err| DeliveryError::UploadShape(format!("invalid 'src' value '{src}': {err}")))?;
    if Url::parse(src).is_err() && joined.host_str() != origin.host_str() {
        return Err(DeliveryError::UploadShape(format!(
            "scheme-relative 'src' value '{src}' is not accepted"
        )));
    }
    Ok(joined)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::payload::sample_png;

    fn target(endpoint: &str) -> RemoteTarget {
        RemoteTarget {
            endpoint: Url::parse(endpoint).unwrap(),
            token: "T".to_string(),
        }
    }

    // Localhost mocks must not be routed through a system proxy.
    fn no_proxy_store(endpoint: &str) -> RemoteStore {
        let http = HttpClient::builder()
            .no_proxy()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .unwrap();
        RemoteStore::with_http_client(target(endpoint), http)
    }

    fn is_png_multipart(request: &Request) -> bool {
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let body = String::from_utf8_lossy(&request.body).to_ascii_lowercase();
        content_type.starts_with("multipart/form-data")
            && body.contains("name=\"file\"")
            && body.contains("filename=\"boat.png\"")
            && body.contains("content-type: image/png")
    }

    #[test]
    fn upload_url_respects_existing_query() {
        let store = RemoteStore::with_http_client(
            target("https://img.example.com/upload?auth=1"),
            HttpClient::new(),
        );
        assert_eq!(
            store.upload_url().as_str(),
            "https://img.example.com/upload?auth=1&authCode=T"
        );

        let bare = RemoteStore::with_http_client(
            target("https://img.example.com/upload"),
            HttpClient::new(),
        );
        assert_eq!(
            bare.upload_url().as_str(),
            "https://img.example.com/upload?authCode=T"
        );
    }

    #[test]
    fn public_url_joins_against_origin_not_endpoint_path() -> anyhow::Result<()> {
        let endpoint = Url::parse("https://img.example.com/api/v2/upload?auth=1")?;
        assert_eq!(
            resolve_public_url(&endpoint, "/file/abc123.png")?.as_str(),
            "https://img.example.com/file/abc123.png"
        );
        assert_eq!(
            resolve_public_url(&endpoint, "file/abc123.png")?.as_str(),
            "https://img.example.com/file/abc123.png"
        );
        assert_eq!(
            resolve_public_url(&endpoint, "https://cdn.example.net/x.png")?.as_str(),
            "https://cdn.example.net/x.png"
        );
        Ok(())
    }

    #[test]
    fn public_url_drops_credentials_and_rejects_foreign_hosts() -> anyhow::Result<()> {
        let endpoint = Url::parse("https://user:pw@img.example.com/upload")?;
        assert_eq!(
            resolve_public_url(&endpoint, "/file/a.png")?.as_str(),
            "https://img.example.com/file/a.png"
        );
        for src in ["//other.host/x.png", "\\\\other.host\\x.png"] {
            assert!(
                matches!(resolve_public_url(&endpoint, src), Err(DeliveryError::UploadShape(_))),
                "{src}"
            );
        }
        Ok(())
    }

    #[test]
    fn transport_errors_do_not_expose_the_token() {
        let http = HttpClient::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let target = RemoteTarget {
            endpoint: Url::parse("http://127.0.0.1:1/upload").unwrap(),
            token: "SECRET_TOKEN".to_string(),
        };
        let err = RemoteStore::with_http_client(target, http)
            .upload(&sample_png(2, 2), "boat.png")
            .err();
        assert!(matches!(err, Some(DeliveryError::UploadTransport(_))));

        let text = err
            .map(|err| format!("{:#}", anyhow::Error::from(err)))
            .unwrap_or_default();
        assert!(text.starts_with("upload request failed: "), "{text}");
        assert!(!text.contains("SECRET_TOKEN"), "{text}");
        assert!(!text.contains("authCode"), "{text}");
        assert_eq!(text.matches("upload request failed").count(), 1);
    }

    #[test]
    fn response_shape_is_validated() {
        assert_eq!(
            parse_upload_response(r#"[{"src": "/file/a.png"}, {"src": "/file/b.png"}]"#).ok(),
            Some("/file/a.png".to_string())
        );
        for body in ["[]", r#"{"src": "/file/a.png"}"#, r#"[{"url": "x"}]"#, r#"[{"src": ""}]"#, "<html>"] {
            assert!(
                matches!(parse_upload_response(body), Err(DeliveryError::UploadShape(_))),
                "{body}"
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_posts_multipart_and_returns_public_url() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(query_param("auth", "1"))
            .and(query_param("authCode", "T"))
            .and(is_png_multipart)
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"src": "/file/abc123.png"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/upload?auth=1", server.uri());
        let url = tokio::task::spawn_blocking(move || {
            no_proxy_store(&endpoint).upload(&sample_png(4, 4), "boat.png")
        })
        .await??;

        assert_eq!(url, format!("{}/file/abc123.png", server.uri()));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_bytes_are_rejected_before_upload() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"src": "/f.png"}])))
            .expect(0)
            .mount(&server)
            .await;

        let endpoint = format!("{}/upload", server.uri());
        let result = tokio::task::spawn_blocking(move || {
            no_proxy_store(&endpoint).upload(b"definitely not an image", "boat.png")
        })
        .await?;

        assert!(matches!(result, Err(DeliveryError::Decode(_))));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_error_status_carries_status_and_body() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad auth code"))
            .mount(&server)
            .await;

        let endpoint = format!("{}/upload", server.uri());
        let result = tokio::task::spawn_blocking(move || {
            no_proxy_store(&endpoint).upload(&sample_png(2, 2), "boat.png")
        })
        .await?;

        match result {
            Err(DeliveryError::UploadStatus { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "bad auth code");
            }
            other => panic!("expected upload status error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_success_with_wrong_shape_is_an_upload_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"link": "x"}})))
            .mount(&server)
            .await;

        let endpoint = format!("{}/upload", server.uri());
        let result = tokio::task::spawn_blocking(move || {
            no_proxy_store(&endpoint).upload(&sample_png(2, 2), "boat.png")
        })
        .await?;

        let err = result.err();
        assert!(matches!(err, Some(DeliveryError::UploadShape(_))));
        assert!(err.map(|err| err.is_upload()).unwrap_or(false));
        Ok(())
    }
}
