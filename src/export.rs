//! Video to YOLO dataset export: frame extraction through `ez_ffmpeg` and
//! per-frame label files.

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bbox::BBox;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Video not found: {0}")]
    VideoNotFound(PathBuf),
    #[error("Directory already exists: {0}")]
    DirectoryExists(PathBuf),
    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),
    #[error("Video support not compiled in (enable the `video` feature)")]
    NoVideoSupport,
    #[error("No frames extracted")]
    NoFrames,
    #[error("Failed to read video width/height")]
    InvalidVideoSize,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageExt {
    #[default]
    Jpg,
    Png,
}

impl ImageExt {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageExt::Jpg => "jpg",
            ImageExt::Png => "png",
        }
    }
}

/// One labelled box; `frame` is 1-based like the extracted file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloLabel {
    pub frame: u32,
    #[serde(rename = "class", alias = "class_name")]
    pub class_name: String,
    pub bbox_xywh: BBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub video_path: PathBuf,
    pub out_dir: PathBuf,
    #[serde(default)]
    pub image_ext: ImageExt,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub labels: Vec<YoloLabel>,
}

/// Class names in order of first appearance; a class id is its position.
///
/// Serializes as a `{name: id}` object whose keys keep that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMap {
    names: Vec<String>,
    ids: HashMap<String, usize>,
}

impl ClassMap {
    /// Id of `name`, assigning the next one on first sight.
    pub fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Serialize for ClassMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (id, name) in self.names.iter().enumerate() {
            map.serialize_entry(name, &id)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
    pub classes_txt: PathBuf,
    pub frames_written: usize,
    pub classes_map: ClassMap,
}

/// What the first video stream reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// 0 when the container doesn't record a frame count.
    pub frames: u64,
}

#[derive(Debug, Default)]
pub struct Exporter;

impl Exporter {
    pub fn new() -> Self {
        Self
    }

    /// Number of video frames, or 0 when the container doesn't report one.
    pub fn frame_count(&self, video: &Path) -> Result<u64, ExportError> {
        ensure_exists(video)?;
        match media::inspect(video) {
            Ok(info) => Ok(info.frames),
            Err(ExportError::Ffmpeg(detail)) => {
                warn!("frame count unavailable for {:?}: {}", video, detail);
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Width and height of the first video stream, `(0, 0)` without one.
    pub fn video_size(&self, video: &Path) -> Result<(u32, u32), ExportError> {
        ensure_exists(video)?;
        let info = media::inspect(video)?;
        Ok((info.width, info.height))
    }

    /// Write every frame as `%06d.<ext>` into `images_dir`; returns how many
    /// files were written.
    pub fn extract_frames(
        &self,
        video: &Path,
        images_dir: &Path,
        ext: ImageExt,
    ) -> Result<usize, ExportError> {
        let pattern = images_dir.join(format!("%06d.{}", ext.as_str()));
        media::extract(video, &pattern)?;

        let written = fs::read_dir(images_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|e| e == ext.as_str()))
            .count();
        debug!("extracted {} frames from {:?}", written, video);
        Ok(written)
    }

    pub fn export_yolo(&self, req: &ExportRequest) -> Result<ExportSummary, ExportError> {
        ensure_exists(&req.video_path)?;

        let images_dir = req.out_dir.join("images");
        let labels_dir = req.out_dir.join("labels");
        prepare_dir(&req.out_dir, req.overwrite)?;
        fs::create_dir_all(&images_dir)?;
        fs::create_dir_all(&labels_dir)?;

        let frames_written = self.extract_frames(&req.video_path, &images_dir, req.image_ext)?;
        if frames_written == 0 {
            return Err(ExportError::NoFrames);
        }

        let (width, height) = self.video_size(&req.video_path)?;
        if width == 0 || height == 0 {
            return Err(ExportError::InvalidVideoSize);
        }

        let classes_map = write_labels(&req.out_dir, &req.labels, frames_written, width, height)?;
        info!(
            "exported {} frames with {} classes to {:?}",
            frames_written,
            classes_map.len(),
            req.out_dir
        );

        Ok(ExportSummary {
            images_dir,
            labels_dir,
            classes_txt: req.out_dir.join("classes.txt"),
            frames_written,
            classes_map,
        })
    }
}

#[cfg(feature = "video")]
mod media {
    use std::path::Path;

    use ez_ffmpeg::stream_info::{StreamInfo, find_video_stream_info};
    use ez_ffmpeg::{FfmpegContext, Input, Output};

    use super::{ExportError, VideoInfo};

    fn ffmpeg_err(e: impl std::fmt::Display) -> ExportError {
        ExportError::Ffmpeg(e.to_string())
    }

    pub(super) fn inspect(video: &Path) -> Result<VideoInfo, ExportError> {
        let info = find_video_stream_info(video.to_string_lossy().into_owned())
            .map_err(ffmpeg_err)?;
        match info {
            Some(StreamInfo::Video {
                width,
                height,
                nb_frames,
                ..
            }) => Ok(VideoInfo {
                width: width.max(0) as u32,
                height: height.max(0) as u32,
                frames: nb_frames.max(0) as u64,
            }),
            _ => Ok(VideoInfo {
                width: 0,
                height: 0,
                frames: 0,
            }),
        }
    }

    pub(super) fn extract(video: &Path, pattern: &Path) -> Result<(), ExportError> {
        let input = Input::from(video.to_string_lossy().into_owned());
        let output = Output::from(pattern.to_string_lossy().into_owned());
        FfmpegContext::builder()
            .input(input)
            .output(output)
            .build()
            .map_err(ffmpeg_err)?
            .start()
            .map_err(ffmpeg_err)?
            .wait()
            .map_err(ffmpeg_err)
    }
}

#[cfg(not(feature = "video"))]
mod media {
    use std::path::Path;

    use super::{ExportError, VideoInfo};

    pub(super) fn inspect(_: &Path) -> Result<VideoInfo, ExportError> {
        Err(ExportError::NoVideoSupport)
    }

    pub(super) fn extract(_: &Path, _: &Path) -> Result<(), ExportError> {
        Err(ExportError::NoVideoSupport)
    }
}

/// Write `labels/%06d.txt` for every labelled frame in `1..=frames` and
/// `classes.txt` in order of first appearance. Returns the class map.
pub fn write_labels(
    out_root: &Path,
    labels: &[YoloLabel],
    frames: usize,
    width: u32,
    height: u32,
) -> Result<ClassMap, ExportError> {
    let mut classes = ClassMap::default();
    for label in labels {
        classes.intern(&label.class_name);
    }

    let mut by_frame: BTreeMap<u32, Vec<&YoloLabel>> = BTreeMap::new();
    for label in labels {
        if (1..=frames as u64).contains(&(label.frame as u64)) {
            by_frame.entry(label.frame).or_default().push(label);
        }
    }

    let labels_dir = out_root.join("labels");
    fs::create_dir_all(&labels_dir)?;
    for (frame, items) in &by_frame {
        let mut out = BufWriter::new(File::create(labels_dir.join(format!("{frame:06}.txt")))?);
        for label in items {
            let n = label.bbox_xywh.normalized(width, height);
            let cid = classes.intern(&label.class_name);
            writeln!(out, "{} {:.6} {:.6} {:.6} {:.6}", cid, n.xc, n.yc, n.width, n.height)?;
        }
        out.flush()?;
    }

    let mut out = BufWriter::new(File::create(out_root.join("classes.txt"))?);
    for name in classes.names() {
        writeln!(out, "{name}")?;
    }
    out.flush()?;

    Ok(classes)
}

fn ensure_exists(video: &Path) -> Result<(), ExportError> {
    if video.exists() {
        Ok(())
    } else {
        Err(ExportError::VideoNotFound(video.to_path_buf()))
    }
}

fn prepare_dir(dir: &Path, overwrite: bool) -> Result<(), ExportError> {
    if dir.exists() {
        if !overwrite {
            return Err(ExportError::DirectoryExists(dir.to_path_buf()));
        }
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}
