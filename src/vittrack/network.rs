use crate::error::EngineError;

/// Raw VitTrack network outputs, each laid out channel-major over the
/// `score_size` x `score_size` grid.
#[derive(Debug, Clone)]
pub struct VitTrackOutputs {
    /// Confidence map (1 x S x S)
    pub conf_map: Vec<f32>,
    /// Size map (2 x S x S): width plane then height plane
    pub size_map: Vec<f32>,
    /// Offset map (2 x S x S): x plane then y plane
    pub offset_map: Vec<f32>,
}

impl VitTrackOutputs {
    /// Check the three maps against the expected grid size.
    pub fn check(&self, score_size: usize) -> Result<(), EngineError> {
        let cells = score_size * score_size;
        if self.conf_map.len() != cells
            || self.size_map.len() != 2 * cells
            || self.offset_map.len() != 2 * cells
        {
            return Err(EngineError::Output(format!(
                "unexpected output sizes conf={} size={} offset={} for a {}x{} grid",
                self.conf_map.len(),
                self.size_map.len(),
                self.offset_map.len(),
                score_size,
                score_size
            )));
        }
        Ok(())
    }
}

/// The VitTrack network weights and runtime.
///
/// One network is loaded per process and shared read-only by every tracker
/// instance, so `infer` takes `&self` and may run from several threads.
pub trait VitNetwork: Send + Sync {
    /// Run inference on a template (1 x T x T x 3, NHWC f32) and a search
    /// window (1 x S x S x 3, NHWC f32).
    fn infer(&self, template: &[f32], search: &[f32]) -> Result<VitTrackOutputs, EngineError>;

    fn supports_accelerator(&self) -> bool {
        false
    }
}
