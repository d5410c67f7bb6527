//! Process-wide model: tuned parameters, device selection and the factory
//! for per-target engine instances.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{EngineBuilder, TrackerEngine};
use crate::error::ModelError;

/// Tracker parameters, loaded once per process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub template_size: usize,
    pub search_size: usize,
    pub score_size: usize,
    pub template_factor: u32,
    pub search_factor: u32,
    pub score_threshold: f32,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            template_size: 128,
            search_size: 256,
            score_size: 16,
            template_factor: 2,
            search_factor: 4,
            score_threshold: 0.25,
        }
    }
}

impl TrackerParams {
    /// Load the parameter set `<dir>/<name>.toml`, with
    /// `VIT_TRACKER_PARAMS__*` environment overrides.
    pub fn load(dir: &Path, name: &str) -> Result<Self, ModelError> {
        let path = dir.join(format!("{name}.toml"));
        if !path.is_file() {
            return Err(ModelError::ParamsNotFound(path));
        }

        let params: TrackerParams = Config::builder()
            .add_source(File::from(path.as_path()))
            .add_source(Environment::with_prefix("VIT_TRACKER_PARAMS").separator("__"))
            .build()?
            .try_deserialize()?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.template_size == 0 || self.search_size == 0 || self.score_size == 0 {
            return Err(ModelError::InvalidParams("sizes must be positive".into()));
        }
        if self.template_factor == 0 || self.search_factor == 0 {
            return Err(ModelError::InvalidParams("crop factors must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ModelError::InvalidParams(format!(
                "score_threshold {} outside [0, 1]",
                self.score_threshold
            )));
        }
        Ok(())
    }
}

/// Compute device an engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

impl FromStr for Device {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            _ => s
                .strip_prefix("cuda:")
                .and_then(|index| index.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| ModelError::InvalidDevice(s.clone())),
        }
    }
}

/// Requested device, before checking what the backend supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceSetting {
    #[default]
    Auto,
    Fixed(Device),
}

impl FromStr for DeviceSetting {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(DeviceSetting::Auto)
        } else {
            s.parse().map(DeviceSetting::Fixed)
        }
    }
}

impl DeviceSetting {
    pub fn resolve(self, accelerator_available: bool) -> Result<Device, ModelError> {
        match self {
            DeviceSetting::Auto if accelerator_available => Ok(Device::Cuda(0)),
            DeviceSetting::Auto => Ok(Device::Cpu),
            DeviceSetting::Fixed(Device::Cpu) => Ok(Device::Cpu),
            DeviceSetting::Fixed(device) if accelerator_available => Ok(device),
            DeviceSetting::Fixed(device) => Err(ModelError::DeviceUnavailable(device.to_string())),
        }
    }
}

/// Where to find the parameter set and which device to prefer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub params_dir: PathBuf,
    pub param_name: String,
    pub device: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            params_dir: PathBuf::from("params"),
            param_name: "vittrack".to_string(),
            device: "auto".to_string(),
        }
    }
}

/// The shared, read-only model. Construct once at startup and hand an
/// `Arc<Model>` to the registry.
pub struct Model {
    params: TrackerParams,
    device: Device,
    builder: Box<dyn EngineBuilder>,
}

impl Model {
    /// Load parameters and pick the device. Failure here is fatal to startup.
    pub fn load(
        config: &ModelConfig,
        builder: Box<dyn EngineBuilder>,
    ) -> Result<Self, ModelError> {
        let setting: DeviceSetting = config.device.parse()?;
        let params = TrackerParams::load(&config.params_dir, &config.param_name)?;
        let device = setting.resolve(builder.accelerator_available())?;

        info!(
            "Loaded parameter set '{}' from {:?} on {}",
            config.param_name, config.params_dir, device
        );
        Ok(Self::from_parts(params, device, builder))
    }

    pub fn from_parts(
        params: TrackerParams,
        device: Device,
        builder: Box<dyn EngineBuilder>,
    ) -> Self {
        Self {
            params,
            device,
            builder,
        }
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Fresh, independent engine instance for one target.
    pub fn new_instance(&self) -> Box<dyn TrackerEngine> {
        self.builder.build(&self.params, &self.device)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("params", &self.params)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
