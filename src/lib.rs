pub mod bbox;
pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod registry;
pub mod service;
pub mod session;
pub mod target;
pub mod vittrack;

pub use bbox::BBox;
pub use engine::{EngineBuilder, RawOutput, RawValue, Tracked, TrackerEngine};
pub use error::{EngineError, ErrorKind, ModelError, TrackError};
pub use model::{Device, Model, TrackerParams};
pub use registry::Registry;
pub use session::Session;
pub use target::{InitOutcome, TargetHandle, UpdateOutcome};
pub use vittrack::{CorrelationNetwork, VitNetwork, VitTrack, VitTrackBuilder};
