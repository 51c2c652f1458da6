//! App-state sync keys, collection versions, and mutation MACs.

use async_trait::async_trait;
use wacore::appstate::hash::HashState;
use wacore::appstate::processor::AppStateMutationMAC;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::{AppStateSyncKey, AppSyncStore};

use super::SessionStore;

type Result<T> = wacore::store::error::Result<T>;

const SYNC_KEY: &str = "sync_key";
const APP_VERSION: &str = "app_version";

/// MACs are bucketed per collection so lookups stay a primary-key hit.
fn mac_bucket(collection: &str) -> String {
    format!("mac:{collection}")
}

/// Stored MAC value: 8-byte big-endian version followed by the MAC.
fn encode_mac(version: u64, value_mac: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + value_mac.len());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(value_mac);
    out
}

pub(super) fn decode_mac(stored: Vec<u8>) -> Option<Vec<u8>> {
    stored.get(8..).map(<[u8]>::to_vec)
}

#[async_trait]
impl AppSyncStore for SessionStore {
    async fn get_sync_key(&self, key_id: &[u8]) -> Result<Option<AppStateSyncKey>> {
        let Some(raw) = self.get(SYNC_KEY, key_id).await.map_err(db_err)? else {
            return Ok(None);
        };
        let (key_data, timestamp, fingerprint): (Vec<u8>, i64, Vec<u8>) =
            bincode::deserialize(&raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(AppStateSyncKey {
            key_data,
            timestamp,
            fingerprint,
        }))
    }

    async fn set_sync_key(&self, key_id: &[u8], key: AppStateSyncKey) -> Result<()> {
        let raw = bincode::serialize(&(&key.key_data, key.timestamp, &key.fingerprint))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(SYNC_KEY, key_id, &raw).await.map_err(db_err)
    }

    async fn get_version(&self, name: &str) -> Result<HashState> {
        match self.get(APP_VERSION, name.as_bytes()).await.map_err(db_err)? {
            Some(raw) => {
                serde_json::from_slice(&raw).map_err(|e| StoreError::Serialization(e.to_string()))
            }
            None => Ok(HashState::default()),
        }
    }

    async fn set_version(&self, name: &str, state: HashState) -> Result<()> {
        let raw = serde_json::to_vec(&state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(APP_VERSION, name.as_bytes(), &raw)
            .await
            .map_err(db_err)
    }

    async fn put_mutation_macs(
        &self,
        name: &str,
        version: u64,
        mutations: &[AppStateMutationMAC],
    ) -> Result<()> {
        let records: Vec<(&[u8], Vec<u8>)> = mutations
            .iter()
            .map(|m| (m.index_mac.as_slice(), encode_mac(version, &m.value_mac)))
            .collect();
        self.put_many(&mac_bucket(name), records)
            .await
            .map_err(db_err)
    }

    async fn get_mutation_mac(&self, name: &str, index_mac: &[u8]) -> Result<Option<Vec<u8>>> {
        let stored = self
            .get(&mac_bucket(name), index_mac)
            .await
            .map_err(db_err)?;
        Ok(stored.and_then(decode_mac))
    }

    async fn delete_mutation_macs(&self, name: &str, index_macs: &[Vec<u8>]) -> Result<()> {
        self.delete_many(&mac_bucket(name), index_macs.iter().map(Vec::as_slice))
            .await
            .map_err(db_err)
    }
}
