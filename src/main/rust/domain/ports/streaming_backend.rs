use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::errors::Result;
use crate::domain::value_objects::{CameraId, SessionHandle};

/// Body of `POST /webrtc/offer`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub camera_id: CameraId,
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OfferRequest {
    pub fn new(camera_id: CameraId, sdp: String) -> Self {
        Self {
            camera_id,
            sdp,
            kind: "offer".to_string(),
        }
    }
}

/// Answer returned by the negotiation endpoint. Fields are optional on the
/// wire; the realtime transport validates them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnswerResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub sdp: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Candidate relayed to `POST /webrtc/icecandidate/{session_id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
}

/// Segmented stream session as returned by `/hls/start` and `/hls/status`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HlsStream {
    pub url: String,
    pub session_id: String,
    #[serde(default)]
    pub camera_id: Option<u32>,
    #[serde(default)]
    pub start_time: Option<f64>,
}

/// Envelope of `GET /cameras/{id}/snapshot/base64`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Base64Snapshot {
    pub data: String,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Subset of `GET /cameras/{id}/status` the client relies on
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraStatus {
    pub camera_id: u32,
    #[serde(default)]
    pub name: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub current_occupancy: Option<u32>,
}

/// Port for the backend REST surface consumed by the transports
#[async_trait]
pub trait StreamingBackend: Send + Sync {
    async fn post_offer(&self, request: OfferRequest) -> Result<AnswerResponse>;

    async fn relay_ice_candidate(
        &self,
        session: &SessionHandle,
        candidate: &IceCandidatePayload,
    ) -> Result<()>;

    async fn delete_realtime_session(&self, session: &SessionHandle) -> Result<()>;

    async fn start_hls(&self, camera_id: CameraId) -> Result<HlsStream>;

    async fn hls_keepalive(&self, session: &SessionHandle) -> Result<()>;

    async fn stop_hls(&self, session: &SessionHandle) -> Result<()>;

    async fn hls_status(&self, session: &SessionHandle) -> Result<HlsStream>;

    /// Raw JPEG bytes. Dropping the future cancels the request.
    async fn fetch_snapshot(&self, camera_id: CameraId) -> Result<Bytes>;

    async fn fetch_snapshot_base64(&self, camera_id: CameraId) -> Result<Base64Snapshot>;

    async fn camera_status(&self, camera_id: CameraId) -> Result<CameraStatus>;
}
