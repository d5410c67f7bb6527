//! Template matching by normalized cross-correlation.

use super::network::{VitNetwork, VitTrackOutputs};
use crate::error::EngineError;

/// Spacing of the template pixels that take part in the match.
const SAMPLE_STRIDE: usize = 4;

/// A [`VitNetwork`] that needs no weights: every grid cell scores the
/// normalized cross-correlation between the template and the search window
/// centered on that cell.
///
/// Only the position is predicted. The size maps stay zero, so the tracked
/// box keeps its extent. Template and search pixels must share one scale,
/// which holds when the search side and crop factor are both twice the
/// template ones (the default parameters).
#[derive(Debug, Clone)]
pub struct CorrelationNetwork {
    score_size: usize,
}

impl CorrelationNetwork {
    pub fn new(score_size: usize) -> Self {
        Self { score_size }
    }
}

impl Default for CorrelationNetwork {
    fn default() -> Self {
        Self::new(16)
    }
}

/// Side of a square NHWC RGB buffer.
fn square_side(len: usize, what: &str) -> Result<usize, EngineError> {
    let side = ((len / 3) as f64).sqrt().round() as usize;
    if side == 0 || side * side * 3 != len {
        return Err(EngineError::Input(format!("{what} of {len} values is not a square RGB image")));
    }
    Ok(side)
}

#[derive(Default)]
struct Moments {
    n: f64,
    a: f64,
    b: f64,
    ab: f64,
    aa: f64,
    bb: f64,
}

impl Moments {
    fn add(&mut self, a: f32, b: f32) {
        let (a, b) = (a as f64, b as f64);
        self.n += 1.0;
        self.a += a;
        self.b += b;
        self.ab += a * b;
        self.aa += a * a;
        self.bb += b * b;
    }

    fn ncc(&self) -> f32 {
        let cov = self.n * self.ab - self.a * self.b;
        let var = (self.n * self.aa - self.a * self.a) * (self.n * self.bb - self.b * self.b);
        if var <= f64::EPSILON {
            return 0.0;
        }
        (cov / var.sqrt()) as f32
    }
}

impl VitNetwork for CorrelationNetwork {
    fn infer(&self, template: &[f32], search: &[f32]) -> Result<VitTrackOutputs, EngineError> {
        let t = square_side(template.len(), "template")?;
        let s = square_side(search.len(), "search")?;
        let grid = self.score_size;
        let cells = grid * grid;

        let samples: Vec<(usize, usize)> = (0..t)
            .step_by(SAMPLE_STRIDE)
            .flat_map(|v| (0..t).step_by(SAMPLE_STRIDE).map(move |u| (u, v)))
            .collect();

        let mut conf_map = vec![0.0; cells];
        for gy in 0..grid {
            for gx in 0..grid {
                // Window of the template's size centered on the cell.
                let left = (gx * s / grid) as isize - (t / 2) as isize;
                let top = (gy * s / grid) as isize - (t / 2) as isize;

                let mut m = Moments::default();
                for &(u, v) in &samples {
                    let (x, y) = (left + u as isize, top + v as isize);
                    if x < 0 || y < 0 || x >= s as isize || y >= s as isize {
                        continue;
                    }
                    let ti = (v * t + u) * 3;
                    let si = (y as usize * s + x as usize) * 3;
                    for c in 0..3 {
                        m.add(template[ti + c], search[si + c]);
                    }
                }

                // Windows hanging mostly outside the search crop don't count.
                if m.n >= (samples.len() * 3) as f64 / 2.0 {
                    conf_map[gy * grid + gx] = m.ncc().max(0.0);
                }
            }
        }

        Ok(VitTrackOutputs {
            conf_map,
            size_map: vec![0.0; 2 * cells],
            offset_map: vec![0.0; 2 * cells],
        })
    }
}
