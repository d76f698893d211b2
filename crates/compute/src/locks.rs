use std::collections::HashMap;
use std::sync::Arc;

use foundation::ids::LayerId;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Per-layer async locks.
///
/// Runs touching overlapping layer sets serialize; disjoint runs do not.
/// Locks are always taken in sorted id order so two runs can't deadlock.
#[derive(Debug, Default, Clone)]
pub struct LayerLocks {
    table: Arc<Mutex<HashMap<LayerId, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held for the duration of one run; releases every layer on drop and
/// forgets the ones no other run is using.
#[derive(Debug)]
pub struct LayerSetGuard {
    ids: Vec<LayerId>,
    guards: Vec<OwnedMutexGuard<()>>,
    locks: LayerLocks,
}

impl LayerSetGuard {
    pub fn ids(&self) -> &[LayerId] {
        &self.ids
    }
}

impl Drop for LayerSetGuard {
    fn drop(&mut self) {
        self.guards.clear();
        self.locks.prune();
    }
}

impl LayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, ids: &[LayerId]) -> LayerSetGuard {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        let mutexes: Vec<_> = {
            let mut table = self.table.lock();
            ids.iter()
                .map(|id| table.entry(id.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for m in mutexes {
            guards.push(m.lock_owned().await);
        }
        LayerSetGuard {
            ids,
            guards,
            locks: self.clone(),
        }
    }

    /// Drops table entries nobody holds or waits on.
    pub fn prune(&self) {
        self.table.lock().retain(|_, m| Arc::strong_count(m) > 1);
    }

    pub fn tracked(&self) -> usize {
        self.table.lock().len()
    }
}
