//! Cached remote pool mirror metadata.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::core::{PeerUuid, PoolId};

/// Mirror metadata of a remote pool, as discovered by the pool watcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemotePoolMeta {
    pub mirror_peer_uuid: PeerUuid,
}

/// Read-mostly cache of remote pool metadata, shared across the replayers
/// of one peer connection. The replayer only reads it.
#[derive(Debug, Default)]
pub struct PoolMetaCache {
    remote: Mutex<BTreeMap<PoolId, RemotePoolMeta>>,
}

impl PoolMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remote_pool_meta(&self, pool_id: PoolId, meta: RemotePoolMeta) {
        self.remote.lock().expect("pool meta lock").insert(pool_id, meta);
    }

    pub fn remove_remote_pool_meta(&self, pool_id: PoolId) {
        self.remote.lock().expect("pool meta lock").remove(&pool_id);
    }

    pub fn remote_pool_meta(&self, pool_id: PoolId) -> Option<RemotePoolMeta> {
        self.remote
            .lock()
            .expect("pool meta lock")
            .get(&pool_id)
            .cloned()
    }
}
