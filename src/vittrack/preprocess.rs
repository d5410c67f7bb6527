use ndarray::{Array3, ArrayView3, s};

use crate::bbox::BBox;

/// ImageNet mean values (RGB order)
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet std values (RGB order)
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Largest crop side, as a multiple of the longer image side.
pub const MAX_CROP_SCALE: i32 = 2;

/// Side of the square crop around `bbox`: sqrt(area) * factor.
pub fn crop_size(bbox: &BBox, factor: u32) -> i32 {
    (bbox.area().max(0.0).sqrt() * factor as f32).ceil() as i32
}

/// Crop a square window centered on `bbox` and turn it into network input
///
/// # Arguments
/// * `image` - Input image in HWC RGB format
/// * `bbox` - Bounding box to crop around
/// * `factor` - Crop factor (2 for template, 4 for search)
/// * `output_size` - Output size (128 for template, 256 for search)
///
/// # Returns
/// * Cropped and normalized image as Vec<f32> in NHWC RGB format
/// * Crop size in original image pixels, at most `MAX_CROP_SCALE` times
///   the longer image side
pub fn crop_and_preprocess(
    image: &ArrayView3<u8>,
    bbox: &BBox,
    factor: u32,
    output_size: usize,
) -> (Vec<f32>, i32) {
    let (img_h, img_w, _channels) = image.dim();
    let (img_h, img_w) = (img_h as i64, img_w as i64);

    let limit = (img_h.max(img_w) as i32).max(1).saturating_mul(MAX_CROP_SCALE);
    let crop_sz = crop_size(bbox, factor).clamp(0, limit);
    let x1 = crop_origin(bbox.x, bbox.width, crop_sz) as i64;
    let y1 = crop_origin(bbox.y, bbox.height, crop_sz) as i64;
    let x2 = x1 + crop_sz as i64;
    let y2 = y1 + crop_sz as i64;

    // Part of the crop that overlaps the image; the rest stays zero padded.
    let roi_x1 = x1.clamp(0, img_w);
    let roi_y1 = y1.clamp(0, img_h);
    let roi_x2 = x2.clamp(0, img_w);
    let roi_y2 = y2.clamp(0, img_h);

    let side = crop_sz as usize;
    let mut crop = Array3::<u8>::zeros((side, side, 3));
    if roi_x2 > roi_x1 && roi_y2 > roi_y1 {
        let (dst_x, dst_y) = ((roi_x1 - x1) as usize, (roi_y1 - y1) as usize);
        let (w, h) = ((roi_x2 - roi_x1) as usize, (roi_y2 - roi_y1) as usize);
        crop.slice_mut(s![dst_y..dst_y + h, dst_x..dst_x + w, ..]).assign(&image.slice(s![
            roi_y1 as usize..roi_y2 as usize,
            roi_x1 as usize..roi_x2 as usize,
            0..3
        ]));
    }

    let resized = resize_bilinear(&crop, output_size, output_size);
    (preprocess_nhwc(&resized), crop_sz)
}

/// Top-left corner of a `crop_sz` window centered on a box edge at `pos`.
pub(crate) fn crop_origin(pos: f32, extent: f32, crop_sz: i32) -> i32 {
    (pos + (extent - crop_sz as f32) / 2.0).floor() as i32
}

/// Resize image using bilinear interpolation
fn resize_bilinear(image: &Array3<u8>, new_h: usize, new_w: usize) -> Array3<u8> {
    let (old_h, old_w, channels) = image.dim();

    if old_h == 0 || old_w == 0 {
        return Array3::<u8>::zeros((new_h, new_w, channels));
    }

    let mut resized = Array3::<u8>::zeros((new_h, new_w, channels));

    let scale_y = old_h as f32 / new_h as f32;
    let scale_x = old_w as f32 / new_w as f32;

    for y in 0..new_h {
        for x in 0..new_w {
            let src_y = y as f32 * scale_y;
            let src_x = x as f32 * scale_x;

            let y0 = (src_y.floor() as usize).min(old_h - 1);
            let y1 = (y0 + 1).min(old_h - 1);
            let x0 = (src_x.floor() as usize).min(old_w - 1);
            let x1 = (x0 + 1).min(old_w - 1);

            let dy = src_y - y0 as f32;
            let dx = src_x - x0 as f32;

            for c in 0..channels {
                let v00 = image[[y0, x0, c]] as f32;
                let v01 = image[[y0, x1, c]] as f32;
                let v10 = image[[y1, x0, c]] as f32;
                let v11 = image[[y1, x1, c]] as f32;

                let value = v00 * (1.0 - dx) * (1.0 - dy)
                    + v01 * dx * (1.0 - dy)
                    + v10 * (1.0 - dx) * dy
                    + v11 * dx * dy;

                resized[[y, x, c]] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    resized
}

/// Scale to [0, 1] and apply ImageNet normalization, flattened NHWC.
fn preprocess_nhwc(image: &Array3<u8>) -> Vec<f32> {
    image
        .indexed_iter()
        .map(|((_, _, ch), &v)| (v as f32 / 255.0 - MEAN[ch]) / STD[ch])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_size_calculation() {
        let bbox = BBox::new(100.0, 100.0, 50.0, 50.0);
        assert_eq!(crop_size(&bbox, 2), 100);
        assert_eq!(crop_size(&bbox, 4), 200);
        assert_eq!(crop_origin(bbox.x, bbox.width, 200), 25);
    }

    #[test]
    fn test_preprocess_shape() {
        let image = Array3::<u8>::zeros((480, 640, 3));
        let bbox = BBox::new(100.0, 100.0, 50.0, 50.0);
        let (result, crop_sz) = crop_and_preprocess(&image.view(), &bbox, 2, 128);

        assert_eq!(result.len(), 128 * 128 * 3);
        assert_eq!(crop_sz, 100);
    }

    #[test]
    fn test_crop_pads_outside_image() {
        // Box in the top-left corner: most of the search window is padding.
        let image = Array3::<u8>::from_elem((40, 40, 3), 255);
        let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
        let (result, crop_sz) = crop_and_preprocess(&image.view(), &bbox, 4, 40);
        assert_eq!(crop_sz, 40);

        let zero = (0.0 - MEAN[0]) / STD[0];
        let white = (1.0 - MEAN[0]) / STD[0];
        // First pixel is padding, last pixel lies inside the image.
        assert!((result[0] - zero).abs() < 1e-5);
        assert!((result[(39 * 40 + 39) * 3] - white).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_box() {
        let image = Array3::<u8>::zeros((20, 20, 3));
        let (result, crop_sz) =
            crop_and_preprocess(&image.view(), &BBox::new(5.0, 5.0, 0.0, 0.0), 2, 16);
        assert_eq!(crop_sz, 0);
        assert_eq!(result.len(), 16 * 16 * 3);
    }

    #[test]
    fn test_huge_box_crop_is_bounded() {
        let image = Array3::<u8>::from_elem((120, 160, 3), 255);
        let bbox = BBox::new(0.0, 0.0, 1e12, 1e12);
        let (result, crop_sz) = crop_and_preprocess(&image.view(), &bbox, 4, 32);
        assert_eq!(crop_sz, 320);
        assert_eq!(result.len(), 32 * 32 * 3);
    }

    #[test]
    fn test_far_away_box_is_all_padding() {
        let image = Array3::<u8>::from_elem((120, 160, 3), 255);
        let bbox = BBox::new(1e12, -1e12, 10.0, 10.0);
        let (result, crop_sz) = crop_and_preprocess(&image.view(), &bbox, 2, 8);
        assert_eq!(crop_sz, 20);

        let zero = (0.0 - MEAN[0]) / STD[0];
        assert!(result.chunks(3).all(|px| (px[0] - zero).abs() < 1e-5));
    }
}
