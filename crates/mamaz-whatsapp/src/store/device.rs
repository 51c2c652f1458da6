//! The paired device identity.

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::DeviceStore;
use wacore::store::Device;

use super::SessionStore;

type Result<T> = wacore::store::error::Result<T>;

const DEVICE: &str = "device";
/// One device per session database.
const DEVICE_ID: &[u8] = b"primary";

#[async_trait]
impl DeviceStore for SessionStore {
    async fn save(&self, device: &Device) -> Result<()> {
        // Device keys use byte-array serde that only binary formats handle.
        let raw =
            bincode::serialize(device).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(DEVICE, DEVICE_ID, &raw).await.map_err(db_err)
    }

    async fn load(&self) -> Result<Option<Device>> {
        match self.get(DEVICE, DEVICE_ID).await.map_err(db_err)? {
            Some(raw) => bincode::deserialize(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.get(DEVICE, DEVICE_ID).await.map_err(db_err)?.is_some())
    }

    async fn create(&self) -> Result<i32> {
        // Populated later through save() once keys exist.
        Ok(1)
    }
}
