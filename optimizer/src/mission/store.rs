//! In-memory mission registry ("persisted state: none in the
//! core" — missions evaporate on restart, exactly the tradeoff documented
//! for `GET /mission/{id}` polling).
//!
//! Same concurrent-map shape as an in-memory `DashMap<String, CachedProfile>`
//! cache: "cache miss is a 404, not a fetch" contract.

use super::{Mission, MissionDeps};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct MissionStore {
    missions: Arc<DashMap<String, Arc<RwLock<Mission>>>>,
}

impl MissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mission` and spawn its orchestrator in the background.
    /// Returns the mission id immediately; callers poll `get` for progress
    /// (`GET /mission/{id}`).
    pub fn launch(&self, mut mission: Mission, deps: Arc<MissionDeps>) -> String {
        let mission_id = mission.mission_id.clone();
        let handle = Arc::new(RwLock::new(mission.clone()));
        self.missions.insert(mission_id.clone(), Arc::clone(&handle));

        tokio::spawn(async move {
            super::run(&handle, &mut mission, &deps).await;
        });

        mission_id
    }

    pub async fn get(&self, mission_id: &str) -> Option<Mission> {
        let entry = self.missions.get(mission_id)?;
        let handle = Arc::clone(entry.value());
        drop(entry);
        Some(handle.read().await.clone())
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }
}
