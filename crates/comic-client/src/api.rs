//! Panel server API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use comic_models::{PanelIdentity, PanelStatus, StyleCatalog, FORCE_OVERWRITE_HEADER};

use crate::error::{ClientError, ClientResult};

/// Operations the client needs from the panel server.
#[async_trait]
pub trait PanelApi: Send + Sync {
    /// Current status of a panel.
    async fn status(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus>;

    /// Request generation from a captured frame.
    async fn generate(
        &self,
        identity: &PanelIdentity,
        frame: Vec<u8>,
        content_type: &str,
        force: bool,
    ) -> ClientResult<PanelStatus>;

    /// Delete a panel.
    async fn delete(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus>;
}

/// HTTP implementation of [`PanelApi`].
#[derive(Clone)]
pub struct HttpPanelClient {
    base_url: String,
    client: Client,
}

impl HttpPanelClient {
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Server from `COMIC_API_URL`, default `http://localhost:8080`.
    pub fn from_env() -> ClientResult<Self> {
        let base = std::env::var("COMIC_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the style catalog.
    pub async fn styles(&self) -> ClientResult<StyleCatalog> {
        let response = self
            .client
            .get(format!("{}/styles", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedResponse { status, body });
        }
        Ok(response.json().await?)
    }

    fn panel_url(&self, identity: &PanelIdentity) -> String {
        panel_url(&self.base_url, identity)
    }
}

/// `{base}/comics/{video}/{style}/{bucket}` with each segment percent-encoded.
pub fn panel_url(base_url: &str, identity: &PanelIdentity) -> String {
    format!(
        "{}/comics/{}/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&identity.video),
        urlencoding::encode(&identity.style),
        urlencoding::encode(&identity.bucket.to_string()),
    )
}

/// Map a server response onto a panel status.
///
/// 400 is a rejection. Otherwise a well-formed status body wins; bodies that
/// do not parse fall back to the HTTP status code.
async fn read_status(response: Response) -> ClientResult<PanelStatus> {
    let code = response.status();
    let text = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<PanelStatus>(&text).ok();

    if code == StatusCode::BAD_REQUEST {
        let message = match parsed {
            Some(PanelStatus::Error { message }) => message,
            _ => text,
        };
        return Err(ClientError::Rejected(message));
    }

    if let Some(status) = parsed {
        return Ok(status);
    }

    match code {
        StatusCode::ACCEPTED => Ok(PanelStatus::Generating),
        StatusCode::NOT_FOUND => Ok(PanelStatus::Missing),
        c if c.is_server_error() => Ok(PanelStatus::error(format!("HTTP {}", c.as_u16()))),
        c => Err(ClientError::UnexpectedResponse {
            status: c.as_u16(),
            body: text,
        }),
    }
}

#[async_trait]
impl PanelApi for HttpPanelClient {
    async fn status(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus> {
        let response = self.client.get(self.panel_url(identity)).send().await?;
        read_status(response).await
    }

    async fn generate(
        &self,
        identity: &PanelIdentity,
        frame: Vec<u8>,
        content_type: &str,
        force: bool,
    ) -> ClientResult<PanelStatus> {
        debug!(panel = %identity, bytes = frame.len(), force, "POST start generation");

        let mut request = self
            .client
            .post(self.panel_url(identity))
            .header(CONTENT_TYPE, content_type)
            .body(frame);
        if force {
            request = request.header(FORCE_OVERWRITE_HEADER, "1");
        }
        read_status(request.send().await?).await
    }

    async fn delete(&self, identity: &PanelIdentity) -> ClientResult<PanelStatus> {
        let response = self.client.delete(self.panel_url(identity)).send().await?;
        read_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comic_models::BucketKey;
    use serde_json::json;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity() -> PanelIdentity {
        PanelIdentity::new("bbb", "noir", BucketKey::from_whole_seconds(30))
    }

    #[test]
    fn test_panel_url_encodes_segments() {
        let id = PanelIdentity::new("my video", "noir", BucketKey::from_whole_seconds(75));
        assert_eq!(
            panel_url("http://api/", &id),
            "http://api/comics/my%20video/noir/01-15"
        );
    }

    #[tokio::test]
    async fn test_status_maps_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comics/bbb/noir/00-30"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ready", "url": "https://cdn/x.jpg" })),
            )
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        assert_eq!(
            client.status(&identity()).await.unwrap(),
            PanelStatus::ready("https://cdn/x.jpg")
        );
    }

    #[tokio::test]
    async fn test_status_falls_back_to_http_code() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/comics/bbb/noir/00-30"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/comics/bbb/noir/00-45"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        assert_eq!(client.status(&identity()).await.unwrap(), PanelStatus::Missing);

        let other = PanelIdentity::new("bbb", "noir", BucketKey::from_whole_seconds(45));
        assert!(matches!(
            client.status(&other).await.unwrap(),
            PanelStatus::Error { .. }
        ));
    }

    #[tokio::test]
    async fn test_bad_request_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "status": "error", "message": "Unknown style: noir" })),
            )
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        match client.status(&identity()).await.unwrap_err() {
            ClientError::Rejected(message) => assert_eq!(message, "Unknown style: noir"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_sends_frame_and_force_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/comics/bbb/noir/00-30"))
            .and(header("content-type", "image/jpeg"))
            .and(header("x-force-overwrite", "1"))
            .and(body_bytes(b"frame".to_vec()))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "status": "generating" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        let status = client
            .generate(&identity(), b"frame".to_vec(), "image/jpeg", true)
            .await
            .unwrap();
        assert_eq!(status, PanelStatus::Generating);
    }

    #[tokio::test]
    async fn test_styles_fetches_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/styles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "noir": { "prompt": "film noir", "label": "Noir" },
                "draft": { "label": "unfinished" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(format!("{}/", server.uri())).unwrap();
        let catalog = tokio_test::assert_ok!(client.styles().await);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.prompt("noir"), Some("film noir"));
        assert!(!catalog.contains("draft"));
    }

    #[tokio::test]
    async fn test_styles_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/styles"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        match client.styles().await.unwrap_err() {
            ClientError::UnexpectedResponse { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "warming up");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/comics/bbb/noir/00-30"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "deleted", "key": "bbb/noir/00-30.jpg" })),
            )
            .mount(&server)
            .await;

        let client = HttpPanelClient::new(server.uri()).unwrap();
        assert_eq!(
            tokio_test::assert_ok!(client.delete(&identity()).await),
            PanelStatus::Deleted {
                key: "bbb/noir/00-30.jpg".into()
            }
        );
    }
}
