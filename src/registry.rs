//! Service root: the session table.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use ndarray::ArrayView3;
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::bbox::BBox;
use crate::error::{Result, TrackError};
use crate::model::{Device, Model};
use crate::session::Session;
use crate::target::{InitOutcome, UpdateOutcome};

pub struct Registry {
    model: Arc<Model>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Registry {
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Create a session and return its id. A supplied id must be unused;
    /// without one a UUID is generated. `device` defaults to the model's.
    pub fn create_session(
        &self,
        session_id: Option<&str>,
        device: Option<Device>,
    ) -> Result<String> {
        let device = device.unwrap_or_else(|| self.model.device());
        let mut sessions = self.sessions.write();

        let id = match session_id {
            Some(id) => id.to_string(),
            None => loop {
                let id = Uuid::new_v4().to_string();
                if !sessions.contains_key(&id) {
                    break id;
                }
            },
        };

        match sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(TrackError::AlreadyExists(id)),
            Entry::Vacant(e) => {
                e.insert(Arc::new(Session::new(id.clone(), device, Arc::clone(&self.model))));
                info!("created session '{}' on {}", id, device);
                Ok(id)
            }
        }
    }

    pub fn get_session(&self, session_id: &str) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| TrackError::SessionNotFound(session_id.to_string()))
    }

    /// Remove a session and dispose its targets. Unknown ids are ignored.
    pub fn close_session(&self, session_id: &str) {
        let removed = self.sessions.write().remove(session_id);
        if let Some(session) = removed {
            let targets = session.len();
            session.close();
            info!("closed session '{}' ({} targets)", session_id, targets);
        }
    }

    /// Initialize a target, creating it if needed. Returns the target id.
    pub fn init_target(
        &self,
        session_id: &str,
        target_id: Option<&str>,
        frame: &ArrayView3<u8>,
        bbox: BBox,
    ) -> Result<(String, InitOutcome)> {
        let session = self.get_session(session_id)?;
        let (target_id, handle) = session.get_or_create_target(target_id)?;
        let outcome = handle.init(frame, bbox)?;
        Ok((target_id, outcome))
    }

    pub fn update_target(
        &self,
        session_id: &str,
        target_id: &str,
        frame: &ArrayView3<u8>,
    ) -> Result<UpdateOutcome> {
        let handle = self.get_session(session_id)?.target(target_id)?;
        handle.update(frame)
    }

    /// Drop a target. The session must exist; the target need not.
    pub fn drop_target(&self, session_id: &str, target_id: &str) -> Result<()> {
        self.get_session(session_id)?.drop_target(target_id);
        Ok(())
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
