//! Request/response types a transport exchanges with the tracker, and the
//! facade that serves them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::decode::decode_image;
use crate::error::{Result, TrackError};
use crate::model::Device;
use crate::registry::Registry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    /// `"cpu"`, `"cuda"` or `"cuda:N"`; the model's device when absent.
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub session_id: String,
    pub image_b64: String,
    pub bbox_xywh: BBox,
    #[serde(default)]
    pub target_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub ok: bool,
    pub elapsed_ms: u64,
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub session_id: String,
    pub target_id: String,
    pub image_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub bbox_xywh: BBox,
    pub score: Option<f32>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTargetRequest {
    pub session_id: String,
    pub target_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Serves decoded requests against a [`Registry`].
#[derive(Clone)]
pub struct TrackingService {
    registry: Arc<Registry>,
}

impl TrackingService {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "ok".to_string(),
        }
    }

    pub fn create_session(&self, req: &CreateSessionRequest) -> Result<CreateSessionResponse> {
        let device = req
            .device
            .as_deref()
            .map(str::parse::<Device>)
            .transpose()
            .map_err(|e| TrackError::InvalidRequest(e.to_string()))?;
        let session_id = self
            .registry
            .create_session(req.session_id.as_deref(), device)?;
        Ok(CreateSessionResponse { session_id })
    }

    pub fn init(&self, req: &InitRequest) -> Result<InitResponse> {
        let frame = decode_image(&req.image_b64)?;
        let (target_id, outcome) = self.registry.init_target(
            &req.session_id,
            req.target_id.as_deref(),
            &frame.view(),
            req.bbox_xywh,
        )?;
        Ok(InitResponse {
            ok: outcome.ok,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            target_id,
        })
    }

    pub fn update(&self, req: &UpdateRequest) -> Result<UpdateResponse> {
        let frame = decode_image(&req.image_b64)?;
        let outcome = self
            .registry
            .update_target(&req.session_id, &req.target_id, &frame.view())?;
        Ok(UpdateResponse {
            bbox_xywh: outcome.bbox,
            score: outcome.score,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        })
    }

    pub fn drop_target(&self, req: &DropTargetRequest) -> Result<OkResponse> {
        self.registry.drop_target(&req.session_id, &req.target_id)?;
        Ok(OkResponse { ok: true })
    }

    /// Always succeeds; closing an unknown session is a no-op.
    pub fn drop_session(&self, req: &DropSessionRequest) -> OkResponse {
        self.registry.close_session(&req.session_id);
        OkResponse { ok: true }
    }
}
