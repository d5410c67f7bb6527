use serde::{Deserialize, Serialize};

/// Bounding box [x, y, width, height] in absolute pixels, top-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub fn from_array(arr: &[f32; 4]) -> Self {
        Self {
            x: arr[0],
            y: arr[1],
            width: arr[2],
            height: arr[3],
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// All components finite and the size non-negative.
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite()) && self.width >= 0.0 && self.height >= 0.0
    }

    /// Center-based coordinates relative to an image of `img_w` x `img_h`
    /// pixels, each clamped to [0, 1].
    pub fn normalized(&self, img_w: u32, img_h: u32) -> NormalizedBox {
        let (cx, cy) = self.center();
        let (w, h) = (img_w as f32, img_h as f32);
        NormalizedBox {
            xc: (cx / w).clamp(0.0, 1.0),
            yc: (cy / h).clamp(0.0, 1.0),
            width: (self.width / w).clamp(0.0, 1.0),
            height: (self.height / h).clamp(0.0, 1.0),
        }
    }
}

impl From<[f32; 4]> for BBox {
    fn from(arr: [f32; 4]) -> Self {
        Self::from_array(&arr)
    }
}

impl From<BBox> for [f32; 4] {
    fn from(bbox: BBox) -> Self {
        bbox.to_array()
    }
}

/// YOLO-style box: center and size as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedBox {
    pub xc: f32,
    pub yc: f32,
    pub width: f32,
    pub height: f32,
}
