use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{ErrorResponse, ResolveRequest, ResolveResponse, ResolverConfig};
use crate::domain::{QualityMap, ResolverError};

pub type Result<T> = std::result::Result<T, ResolverError>;

/// Talks to the link resolver. One request per call, no retries: the
/// caller decides what a failure means.
#[derive(Clone)]
pub struct ResolverClient {
    config: ResolverConfig,
    http: Client,
}

impl ResolverClient {
    pub fn new(config: ResolverConfig) -> std::result::Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Ask the resolver for the available qualities of `url`.
    pub async fn resolve(&self, url: &str) -> Result<QualityMap> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ResolverError::InvalidInput);
        }

        info!(endpoint = %self.config.endpoint, "resolving {}", url);

        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&ResolveRequest { url })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.message);
            warn!(status = status.as_u16(), ?message, "resolver returned an error status");
            return Err(ResolverError::ServerError(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let parsed: ResolveResponse = serde_json::from_slice(&body)
            .map_err(|e| ResolverError::MalformedResponse(format!("JSON decode error: {}", e)))?;

        let map = into_quality_map(parsed)?;
        debug!(qualities = map.len(), title = ?map.title, "resolver answered");
        Ok(map)
    }
}

fn into_quality_map(response: ResolveResponse) -> Result<QualityMap> {
    if response.success == Some(false) {
        warn!(message = ?response.message, "resolver reported failure");
        return Err(ResolverError::EmptyResult);
    }

    let Some(links) = response.links else {
        warn!(message = ?response.message, "resolver response has no links");
        return Err(ResolverError::EmptyResult);
    };

    let entries: Vec<(String, String)> = links
        .into_iter()
        .filter_map(|(quality, link)| match link {
            Value::String(link) if !link.trim().is_empty() => Some((quality, link)),
            other => {
                debug!(%quality, value = %other, "skipping unusable link entry");
                None
            }
        })
        .collect();

    if entries.is_empty() {
        warn!(message = ?response.message, id = ?response.id, "no usable links");
        return Err(ResolverError::EmptyResult);
    }

    let title = response
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(QualityMap::new(entries, title))
}

fn classify(err: reqwest::Error) -> ResolverError {
    if err.is_timeout() {
        ResolverError::Timeout
    } else if err.is_connect() {
        ResolverError::Unreachable
    } else if let Some(status) = err.status() {
        ResolverError::ServerError(status.as_u16())
    } else if err.is_request() {
        ResolverError::Unreachable
    } else {
        ResolverError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn client_for(endpoint: String, timeout: Duration) -> ResolverClient {
        ResolverClient::new(ResolverConfig { endpoint, timeout }).unwrap()
    }

    async fn serve(body: &str, status: usize) -> (mockito::ServerGuard, mockito::Mock) {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/download")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({ "url": "https://fb.watch/abc" })))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;
        (server, mock)
    }

    #[test]
    fn test_new_keeps_config() {
        let config = ResolverConfig {
            endpoint: "http://localhost:9/api/download".to_string(),
            timeout: Duration::from_millis(750),
        };
        let client: std::result::Result<ResolverClient, reqwest::Error> =
            ResolverClient::new(config.clone());
        let client = client.unwrap();
        assert_eq!(client.config().endpoint, config.endpoint);
        assert_eq!(client.config().timeout, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_resolve_keeps_order_and_title() {
        let body = r#"{"success":true,"title":"Demo","links":{"720p":"https://x/video.mp4","480p":"https://x/v2.mp4","360p":"https://x/v3.mp4"}}"#;
        let (server, mock) = serve(body, 200).await;
        let client = client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));

        let map = client.resolve("  https://fb.watch/abc ").await.unwrap();
        mock.assert_async().await;

        assert_eq!(map.labels().collect::<Vec<_>>(), vec!["720p", "480p", "360p"]);
        assert_eq!(map.title.as_deref(), Some("Demo"));
        assert_eq!(map.select(1).unwrap().raw_url, "https://x/v2.mp4");
    }

    #[tokio::test]
    async fn test_empty_links_is_empty_result() {
        let (server, _mock) = serve(r#"{"links":{}}"#, 200).await;
        let client = client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::EmptyResult)
        );
    }

    #[tokio::test]
    async fn test_missing_links_and_non_string_links() {
        let (server, _mock) = serve(r#"{"success":true,"title":"x"}"#, 200).await;
        let client = client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::EmptyResult)
        );

        let (server, _mock) = serve(r#"{"links":{"720p":null,"480p":42}}"#, 200).await;
        let client = client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::EmptyResult)
        );
    }

    #[tokio::test]
    async fn test_wrong_shape_is_malformed() {
        for body in [r#"{"links":["a","b"]}"#, "<html>oops</html>", "[1,2]"] {
            let (server, _mock) = serve(body, 200).await;
            let client =
                client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));
            let err = client.resolve("https://fb.watch/abc").await.unwrap_err();
            assert!(
                matches!(err, ResolverError::MalformedResponse(_)),
                "body {body:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_error_status_is_server_error() {
        let body = r#"{"success":false,"message":"failed to fetch page"}"#;
        let (server, _mock) = serve(body, 500).await;
        let client = client_for(format!("{}/api/download", server.url()), Duration::from_secs(5));
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::ServerError(500))
        );
    }

    #[tokio::test]
    async fn test_blank_input_is_rejected_without_request() {
        let client = client_for("http://127.0.0.1:9/api/download".to_string(), Duration::from_secs(1));
        assert_eq!(client.resolve("   ").await, Err(ResolverError::InvalidInput));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = client_for(format!("http://{}/api/download", addr), Duration::from_millis(200));
        let started = std::time::Instant::now();
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::Timeout)
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{}/api/download", addr), Duration::from_secs(5));
        assert_eq!(
            client.resolve("https://fb.watch/abc").await,
            Err(ResolverError::Unreachable)
        );
    }
}
