use std::time::{Duration, Instant};

use ndarray::ArrayView3;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bbox::BBox;
use crate::engine::{TrackerEngine, normalize_output};
use crate::error::{Result, TrackError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Tracking,
    Disposed,
}

/// Result of [`TargetHandle::init`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitOutcome {
    pub ok: bool,
    pub elapsed: Duration,
}

/// Result of [`TargetHandle::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    pub bbox: BBox,
    pub score: Option<f32>,
    pub elapsed: Duration,
}

struct Slot {
    phase: Phase,
    engine: Option<Box<dyn TrackerEngine>>,
}

/// One tracked object. Owns its engine instance exclusively; every call into
/// the engine happens under `slot`'s lock.
pub struct TargetHandle {
    id: String,
    session_id: String,
    slot: Mutex<Slot>,
}

impl TargetHandle {
    pub fn new(id: String, session_id: String, engine: Box<dyn TrackerEngine>) -> Self {
        Self {
            id,
            session_id,
            slot: Mutex::new(Slot {
                phase: Phase::Uninitialized,
                engine: Some(engine),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current phase. Blocks while a call is in flight.
    pub fn phase(&self) -> Phase {
        self.slot.lock().phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == Phase::Tracking
    }

    /// Start (or restart) tracking `bbox` on `frame`.
    ///
    /// Calling this on a target that is already tracking resets the engine's
    /// temporal state; nothing from the previous run carries over.
    pub fn init(&self, frame: &ArrayView3<u8>, bbox: BBox) -> Result<InitOutcome> {
        if !bbox.is_valid() {
            return Err(TrackError::InvalidRequest(format!("invalid bbox {:?}", bbox)));
        }

        let mut slot = self.slot.lock();
        let start = Instant::now();
        let engine = self.engine(&mut slot)?;

        if let Err(e) = engine.initialize(frame, bbox) {
            warn!("init of target '{}' failed: {}", self.id, e);
            slot.phase = Phase::Uninitialized;
            return Err(e.into());
        }
        slot.phase = Phase::Tracking;

        let elapsed = start.elapsed();
        debug!(
            "target '{}/{}' initialized at {:?} in {:?}",
            self.session_id, self.id, bbox, elapsed
        );
        Ok(InitOutcome { ok: true, elapsed })
    }

    /// Track one more frame. Frames must arrive in order: every call moves
    /// the engine's hidden state forward.
    pub fn update(&self, frame: &ArrayView3<u8>) -> Result<UpdateOutcome> {
        let mut slot = self.slot.lock();
        match slot.phase {
            Phase::Disposed => return Err(self.not_found()),
            Phase::Uninitialized => return Err(TrackError::NotInitialized(self.id.clone())),
            Phase::Tracking => {}
        }

        let start = Instant::now();
        let raw = self.engine(&mut slot)?.track(frame).inspect_err(|e| {
            warn!("update of target '{}' failed: {}", self.id, e);
        })?;
        let tracked = normalize_output(raw)?;
        let elapsed = start.elapsed();

        debug!("target '{}/{}' -> {:?} in {:?}", self.session_id, self.id, tracked.bbox, elapsed);
        Ok(UpdateOutcome {
            bbox: tracked.bbox,
            score: tracked.score,
            elapsed,
        })
    }

    /// Release the engine. Waits for an in-flight call to finish first.
    pub fn dispose(&self) {
        let mut slot = self.slot.lock();
        slot.phase = Phase::Disposed;
        slot.engine.take();
        debug!("target '{}/{}' disposed", self.session_id, self.id);
    }

    fn engine<'a>(&self, slot: &'a mut Slot) -> Result<&'a mut Box<dyn TrackerEngine>> {
        match slot.phase {
            Phase::Disposed => Err(self.not_found()),
            _ => slot.engine.as_mut().ok_or_else(|| self.not_found()),
        }
    }

    fn not_found(&self) -> TrackError {
        TrackError::TargetNotFound {
            session: self.session_id.clone(),
            target: self.id.clone(),
        }
    }
}


impl std::fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetHandle")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
