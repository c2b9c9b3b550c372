use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    AnswerResponse, Base64Snapshot, CameraStatus, HlsStream, IceCandidatePayload, OfferRequest,
    StreamingBackend,
};
use crate::domain::value_objects::{BackendConfig, CameraId, SessionHandle};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `StreamingBackend` over the backend's REST API
#[derive(Clone)]
pub struct HttpStreamingBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpStreamingBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| DomainError::Request {
                endpoint: config.base_url().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.config.http_url(path))
    }

    /// Send and map transport failures and non-2xx statuses to domain errors
    async fn execute(&self, path: &str, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| DomainError::Request {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(endpoint = path, status = status.as_u16(), "Backend rejected request");
            return Err(DomainError::HttpStatus {
                endpoint: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        self.execute(path, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| DomainError::MalformedResponse {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })
    }

    async fn ack(&self, path: &str, request: RequestBuilder) -> Result<()> {
        self.execute(path, request).await.map(|_| ())
    }
}

#[async_trait]
impl StreamingBackend for HttpStreamingBackend {
    async fn post_offer(&self, request: OfferRequest) -> Result<AnswerResponse> {
        let path = "/webrtc/offer";
        self.json(path, self.request(Method::POST, path).json(&request))
            .await
    }

    async fn relay_ice_candidate(
        &self,
        session: &SessionHandle,
        candidate: &IceCandidatePayload,
    ) -> Result<()> {
        let path = format!("/webrtc/icecandidate/{}", session);
        self.ack(&path, self.request(Method::POST, &path).json(candidate))
            .await
    }

    async fn delete_realtime_session(&self, session: &SessionHandle) -> Result<()> {
        let path = format!("/webrtc/session/{}", session);
        self.ack(&path, self.request(Method::DELETE, &path)).await
    }

    async fn start_hls(&self, camera_id: CameraId) -> Result<HlsStream> {
        let path = format!("/hls/start/{}", camera_id);
        self.json(&path, self.request(Method::POST, &path)).await
    }

    async fn hls_keepalive(&self, session: &SessionHandle) -> Result<()> {
        let path = format!("/hls/keepalive/{}", session);
        self.ack(&path, self.request(Method::POST, &path)).await
    }

    async fn stop_hls(&self, session: &SessionHandle) -> Result<()> {
        let path = format!("/hls/stop/{}", session);
        self.ack(&path, self.request(Method::DELETE, &path)).await
    }

    async fn hls_status(&self, session: &SessionHandle) -> Result<HlsStream> {
        let path = format!("/hls/status/{}", session);
        self.json(&path, self.request(Method::GET, &path)).await
    }

    async fn fetch_snapshot(&self, camera_id: CameraId) -> Result<Bytes> {
        let path = format!("/cameras/{}/snapshot", camera_id);
        self.execute(&path, self.request(Method::GET, &path))
            .await?
            .bytes()
            .await
            .map_err(|e| DomainError::Request {
                endpoint: path,
                reason: e.to_string(),
            })
    }

    async fn fetch_snapshot_base64(&self, camera_id: CameraId) -> Result<Base64Snapshot> {
        let path = format!("/cameras/{}/snapshot/base64", camera_id);
        self.json(&path, self.request(Method::GET, &path)).await
    }

    async fn camera_status(&self, camera_id: CameraId) -> Result<CameraStatus> {
        let path = format!("/cameras/{}/status", camera_id);
        self.json(&path, self.request(Method::GET, &path)).await
    }
}
