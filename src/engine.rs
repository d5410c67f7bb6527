//! Boundary to the external tracking engine.
//!
//! Engines report results in whatever shape suits them; [`normalize_output`]
//! is the only place that knows about those shapes.

use std::collections::HashMap;

use ndarray::ArrayView3;

use crate::bbox::BBox;
use crate::error::{EngineError, TrackError};
use crate::model::{Device, TrackerParams};

/// Keys that may carry the box in a keyed output, in lookup order.
pub const BBOX_KEYS: [&str; 3] = ["target_bbox", "bbox", "target_box"];
pub const SCORE_KEY: &str = "score";

/// A stateful single-object tracker instance.
///
/// Frames are HWC `u8` rasters with three channels.
pub trait TrackerEngine: Send {
    /// Start tracking `bbox` on `frame`, discarding any previous state.
    fn initialize(&mut self, frame: &ArrayView3<u8>, bbox: BBox) -> Result<(), EngineError>;

    /// Advance one frame.
    fn track(&mut self, frame: &ArrayView3<u8>) -> Result<RawOutput, EngineError>;
}

/// Builds engine instances from the loaded model parameters.
pub trait EngineBuilder: Send + Sync {
    fn build(&self, params: &TrackerParams, device: &Device) -> Box<dyn TrackerEngine>;

    /// Whether this backend can run on an accelerator in this process.
    fn accelerator_available(&self) -> bool {
        false
    }
}

impl<F> EngineBuilder for F
where
    F: Fn(&TrackerParams, &Device) -> Box<dyn TrackerEngine> + Send + Sync,
{
    fn build(&self, params: &TrackerParams, device: &Device) -> Box<dyn TrackerEngine> {
        self(params, device)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Scalar(f32),
    Vector(Vec<f32>),
}

/// Engine output before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Keyed(HashMap<String, RawValue>),
    Sequence(Vec<f32>),
}

/// Canonical tracking result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tracked {
    pub bbox: BBox,
    pub score: Option<f32>,
}

pub fn normalize_output(output: RawOutput) -> Result<Tracked, TrackError> {
    let (values, score) = match output {
        RawOutput::Keyed(map) => {
            // First key holding a usable box wins; empty or short values fall through.
            let values = BBOX_KEYS
                .iter()
                .find_map(|key| match map.get(*key) {
                    Some(RawValue::Vector(v)) if v.len() >= 4 => Some(v.clone()),
                    _ => None,
                })
                .ok_or_else(|| {
                    TrackError::TrackerOutput(format!(
                        "no 4-value box under any of {:?} in keyed output",
                        BBOX_KEYS
                    ))
                })?;
            let score = match map.get(SCORE_KEY) {
                Some(RawValue::Scalar(s)) => Some(*s),
                Some(RawValue::Vector(v)) if v.len() == 1 => Some(v[0]),
                _ => None,
            };
            (values, score)
        }
        RawOutput::Sequence(values) => (values, None),
    };

    if values.len() < 4 {
        return Err(TrackError::TrackerOutput(format!(
            "expected 4 bbox values, got {}",
            values.len()
        )));
    }
    let bbox = BBox::new(values[0], values[1], values[2], values[3]);
    if !bbox.to_array().iter().all(|v| v.is_finite()) {
        return Err(TrackError::TrackerOutput(format!("non-finite bbox {:?}", bbox)));
    }

    Ok(Tracked { bbox, score })
}
