//! VitTrack single-object tracker on top of a shared [`VitNetwork`].

pub mod correlation;
pub mod network;
pub mod postprocess;
pub mod preprocess;

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::ArrayView3;

use crate::bbox::BBox;
use crate::engine::{EngineBuilder, RawOutput, RawValue, TrackerEngine};
use crate::error::EngineError;
use crate::model::{Device, TrackerParams};

pub use correlation::CorrelationNetwork;
pub use network::{VitNetwork, VitTrackOutputs};
pub use postprocess::TrackingResult;

use postprocess::{hann2d, process_outputs};
use preprocess::{MAX_CROP_SCALE, crop_and_preprocess};

/// VitTrack tracker for one target
pub struct VitTrack {
    params: TrackerParams,
    network: Arc<dyn VitNetwork>,
    hanning: Vec<f32>,
    template: Option<Vec<f32>>,
    rect_last: [f32; 4],
}

impl VitTrack {
    pub fn new(network: Arc<dyn VitNetwork>, params: TrackerParams) -> Self {
        let hanning = hann2d(params.score_size, params.score_size);
        Self {
            params,
            network,
            hanning,
            template: None,
            rect_last: [0.0; 4],
        }
    }

    /// Current bounding box
    pub fn bbox(&self) -> BBox {
        BBox::from_array(&self.rect_last)
    }

    pub fn is_initialized(&self) -> bool {
        self.template.is_some()
    }

    /// Track the object into `image` and return the decoded maps.
    pub fn step(&mut self, image: &ArrayView3<u8>) -> Result<TrackingResult, EngineError> {
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| EngineError::Input("tracker has no template".into()))?;

        let bbox = BBox::from_array(&self.rect_last);
        let (search, crop_size) =
            crop_and_preprocess(image, &bbox, self.params.search_factor, self.params.search_size);

        let outputs = self.network.infer(template, &search)?;
        outputs.check(self.params.score_size)?;

        let mut result = process_outputs(
            &outputs,
            &self.hanning,
            self.params.score_size,
            &mut self.rect_last,
            crop_size,
            self.params.score_threshold,
        );

        // The network may predict any size; keep the box within reach of a crop.
        let (img_h, img_w, _) = image.dim();
        let scale = MAX_CROP_SCALE as f32;
        self.rect_last[2] = self.rect_last[2].min(img_w as f32 * scale);
        self.rect_last[3] = self.rect_last[3].min(img_h as f32 * scale);
        result.bbox = self.rect_last;
        Ok(result)
    }
}

/// A box the tracker can crop around: it overlaps the frame and no side is
/// longer than `MAX_CROP_SCALE` times the frame.
fn check_init_box(bbox: &BBox, img_w: usize, img_h: usize) -> Result<(), EngineError> {
    let (w, h) = (img_w as f32, img_h as f32);
    let scale = MAX_CROP_SCALE as f32;
    if bbox.width > w * scale || bbox.height > h * scale {
        return Err(EngineError::Input(format!(
            "box {}x{} is too large for a {}x{} frame",
            bbox.width, bbox.height, img_w, img_h
        )));
    }
    let overlaps = bbox.x < w
        && bbox.y < h
        && bbox.x + bbox.width > 0.0
        && bbox.y + bbox.height > 0.0;
    if !overlaps {
        return Err(EngineError::Input(format!(
            "box at ({}, {}) lies outside the {}x{} frame",
            bbox.x, bbox.y, img_w, img_h
        )));
    }
    Ok(())
}

impl TrackerEngine for VitTrack {
    fn initialize(&mut self, image: &ArrayView3<u8>, bbox: BBox) -> Result<(), EngineError> {
        let (img_h, img_w, channels) = image.dim();
        if channels < 3 {
            return Err(EngineError::Input(format!("expected 3 channels, got {channels}")));
        }
        check_init_box(&bbox, img_w, img_h)?;
        self.rect_last = bbox.to_array();
        let (template, _crop_size) = crop_and_preprocess(
            image,
            &bbox,
            self.params.template_factor,
            self.params.template_size,
        );
        self.template = Some(template);
        Ok(())
    }

    fn track(&mut self, image: &ArrayView3<u8>) -> Result<RawOutput, EngineError> {
        let result = self.step(image)?;
        let mut out = HashMap::new();
        out.insert("target_bbox".to_string(), RawValue::Vector(result.bbox.to_vec()));
        out.insert("score".to_string(), RawValue::Scalar(result.score));
        Ok(RawOutput::Keyed(out))
    }
}

/// Builds [`VitTrack`] instances sharing one loaded network.
pub struct VitTrackBuilder {
    network: Arc<dyn VitNetwork>,
}

impl VitTrackBuilder {
    pub fn new(network: Arc<dyn VitNetwork>) -> Self {
        Self { network }
    }
}

impl EngineBuilder for VitTrackBuilder {
    fn build(&self, params: &TrackerParams, _device: &Device) -> Box<dyn TrackerEngine> {
        Box::new(VitTrack::new(Arc::clone(&self.network), params.clone()))
    }

    fn accelerator_available(&self) -> bool {
        self.network.supports_accelerator()
    }
}
