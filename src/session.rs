use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, TrackError};
use crate::model::{Device, Model};
use crate::target::TargetHandle;

#[derive(Default)]
struct Targets {
    closed: bool,
    map: HashMap<String, Arc<TargetHandle>>,
}

/// A group of targets. The map lock is held only for insert, lookup and
/// remove; inference and disposal run outside it.
pub struct Session {
    id: String,
    device: Device,
    model: Arc<Model>,
    targets: Mutex<Targets>,
    next_id: AtomicU64,
}

impl Session {
    pub fn new(id: String, device: Device, model: Arc<Model>) -> Self {
        Self {
            id,
            device,
            model,
            targets: Mutex::new(Targets::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Attach to `target_id` if it exists, otherwise create it. Without an
    /// id a fresh one is generated.
    pub fn get_or_create_target(
        &self,
        target_id: Option<&str>,
    ) -> Result<(String, Arc<TargetHandle>)> {
        if let Some(id) = target_id {
            let targets = self.targets.lock();
            self.ensure_open(&targets)?;
            if let Some(existing) = targets.map.get(id) {
                debug!("attached to target '{}/{}'", self.id, id);
                return Ok((id.to_string(), Arc::clone(existing)));
            }
        }

        // Built outside the map lock; engine construction may be slow.
        let engine = self.model.new_instance();

        let mut targets = self.targets.lock();
        self.ensure_open(&targets)?;
        let id = match target_id {
            Some(id) => id.to_string(),
            None => self.fresh_id(&targets.map),
        };
        let handle = match targets.map.entry(id.clone()) {
            // Lost a race with another creator of the same id.
            Entry::Occupied(e) => Arc::clone(e.get()),
            Entry::Vacant(e) => {
                debug!("created target '{}/{}'", self.id, id);
                Arc::clone(e.insert(Arc::new(TargetHandle::new(
                    id.clone(),
                    self.id.clone(),
                    engine,
                ))))
            }
        };
        Ok((id, handle))
    }

    pub fn target(&self, target_id: &str) -> Result<Arc<TargetHandle>> {
        let targets = self.targets.lock();
        self.ensure_open(&targets)?;
        targets
            .map
            .get(target_id)
            .cloned()
            .ok_or_else(|| TrackError::TargetNotFound {
                session: self.id.clone(),
                target: target_id.to_string(),
            })
    }

    /// Remove and dispose a target. Absent ids are ignored.
    pub fn drop_target(&self, target_id: &str) {
        let removed = self.targets.lock().map.remove(target_id);
        if let Some(handle) = removed {
            handle.dispose();
        }
    }

    /// Dispose every target. The session accepts no new targets afterwards.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut targets = self.targets.lock();
            targets.closed = true;
            targets.map.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            handle.dispose();
        }
    }

    pub fn target_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.targets.lock().map.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.targets.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self, targets: &Targets) -> Result<()> {
        if targets.closed {
            Err(TrackError::SessionNotFound(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn fresh_id(&self, map: &HashMap<String, Arc<TargetHandle>>) -> String {
        loop {
            let id = format!("T{}", self.next_id.fetch_add(1, Ordering::Relaxed));
            if !map.contains_key(&id) {
                return id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayView3;

    use crate::bbox::BBox;
    use crate::engine::{RawOutput, TrackerEngine};
    use crate::error::{EngineError, ErrorKind};
    use crate::model::TrackerParams;

    struct Still;

    impl TrackerEngine for Still {
        fn initialize(&mut self, _: &ArrayView3<u8>, _: BBox) -> Result<(), EngineError> {
            Ok(())
        }

        fn track(&mut self, _: &ArrayView3<u8>) -> Result<RawOutput, EngineError> {
            Ok(RawOutput::Sequence(vec![0.0, 0.0, 1.0, 1.0]))
        }
    }

    fn session() -> Session {
        let builder = |_: &TrackerParams, _: &Device| -> Box<dyn TrackerEngine> { Box::new(Still) };
        let model = Model::from_parts(TrackerParams::default(), Device::Cpu, Box::new(builder));
        Session::new("s1".into(), Device::Cpu, Arc::new(model))
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let session = session();
        let (a, _) = session.get_or_create_target(None).unwrap();
        let (b, _) = session.get_or_create_target(None).unwrap();
        assert_ne!(a, b);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_generated_id_skips_taken() {
        let session = session();
        session.get_or_create_target(Some("T1")).unwrap();
        let (id, _) = session.get_or_create_target(None).unwrap();
        assert_ne!(id, "T1");
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_attach_returns_same_handle() {
        let session = session();
        let (_, first) = session.get_or_create_target(Some("T1")).unwrap();
        let (id, second) = session.get_or_create_target(Some("T1")).unwrap();
        assert_eq!(id, "T1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_drop_target_is_idempotent() {
        let session = session();
        let (_, handle) = session.get_or_create_target(Some("obj1")).unwrap();
        session.drop_target("obj1");
        session.drop_target("obj1");
        session.drop_target("never-existed");

        assert!(session.is_empty());
        let err = session.target("obj1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(handle.phase(), crate::target::Phase::Disposed);
    }

    #[test]
    fn test_closed_session_rejects_targets() {
        let session = session();
        let (_, handle) = session.get_or_create_target(Some("a")).unwrap();
        session.close();

        assert!(session.is_empty());
        assert_eq!(handle.phase(), crate::target::Phase::Disposed);
        let err = session.get_or_create_target(None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
