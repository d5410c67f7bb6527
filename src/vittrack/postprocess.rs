use super::network::VitTrackOutputs;
use super::preprocess::crop_origin;

/// Decoded network output for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingResult {
    pub success: bool,
    pub bbox: [f32; 4], // [x, y, w, h]
    pub score: f32,
}

/// Create 1D Hanning window (matching OpenCV implementation)
pub fn hann1d(size: usize) -> Vec<f32> {
    let pi = std::f32::consts::PI;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * pi / (size + 1) as f32 * (i + 1) as f32).cos()))
        .collect()
}

/// Create 2D Hanning window as flat array
pub fn hann2d(rows: usize, cols: usize) -> Vec<f32> {
    let hann_rows = hann1d(rows);
    let hann_cols = hann1d(cols);

    let mut window = vec![0.0f32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            window[r * cols + c] = hann_rows[r] * hann_cols[c];
        }
    }
    window
}

/// Process model outputs
///
/// # Arguments
/// * `outputs` - Network maps over a `score_size` x `score_size` grid
/// * `hanning` - Hanning window over the same grid
/// * `rect_last` - Previous bounding box [x, y, w, h], updated in place
/// * `crop_size` - Search crop size in original image pixels
/// * `threshold` - Score threshold below which the box is kept
pub fn process_outputs(
    outputs: &VitTrackOutputs,
    hanning: &[f32],
    score_size: usize,
    rect_last: &mut [f32; 4],
    crop_size: i32,
    threshold: f32,
) -> TrackingResult {
    let cells = score_size * score_size;

    let windowed: Vec<f32> = outputs
        .conf_map
        .iter()
        .zip(hanning)
        .map(|(c, h)| c * h)
        .collect();

    let (max_idx, max_score) = find_max(&windowed);

    if max_score < threshold {
        return TrackingResult {
            success: false,
            bbox: *rect_last,
            score: max_score,
        };
    }

    let max_loc_y = max_idx / score_size;
    let max_loc_x = max_idx % score_size;

    // Planes are channel-major: index = channel * cells + y * S + x
    let offset_x = outputs.offset_map[max_idx];
    let offset_y = outputs.offset_map[cells + max_idx];
    let size_w = outputs.size_map[max_idx];
    let size_h = outputs.size_map[cells + max_idx];

    // Normalized center in the search crop
    let cx = (max_loc_x as f32 + offset_x) / score_size as f32;
    let cy = (max_loc_y as f32 + offset_y) / score_size as f32;

    update_rect(rect_last, cx, cy, size_w, size_h, crop_size);

    TrackingResult {
        success: true,
        bbox: *rect_last,
        score: max_score,
    }
}

/// Find maximum value and its index
fn find_max(arr: &[f32]) -> (usize, f32) {
    arr.iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (idx, val)| {
            if val > best.1 { (idx, val) } else { best }
        })
}

/// Map a normalized box in the search crop back to image pixels
///
/// A non-positive or NaN size prediction keeps the previous extent and only
/// moves the center.
fn update_rect(rect: &mut [f32; 4], cx: f32, cy: f32, w: f32, h: f32, crop_size: i32) {
    if crop_size <= 0 {
        return;
    }
    // Origin of crop in original image
    let x0 = crop_origin(rect[0], rect[2], crop_size) as f32;
    let y0 = crop_origin(rect[1], rect[3], crop_size) as f32;
    let crop = crop_size as f32;

    let (w, h) = if w > 0.0 && h > 0.0 {
        (w, h)
    } else {
        (rect[2] / crop, rect[3] / crop)
    };

    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;

    rect[0] = (x1 * crop + x0).floor();
    rect[1] = (y1 * crop + y0).floor();
    rect[2] = (w * crop).floor().max(0.0);
    rect[3] = (h * crop).floor().max(0.0);
}
