//! SKDM recipients, LID/phone mappings, base keys, device lists, and
//! forget-sender-key marks.

use async_trait::async_trait;
use wacore::store::error::{db_err, StoreError};
use wacore::store::traits::{DeviceListRecord, LidPnMappingEntry, ProtocolStore};

use super::{key_string, SessionStore};

type Result<T> = wacore::store::error::Result<T>;

const LID: &str = "lid";
const PN_INDEX: &str = "pn";
const BASE_KEY: &str = "base_key";
const DEVICE_LIST: &str = "device_list";

fn skdm_bucket(group_jid: &str) -> String {
    format!("skdm:{group_jid}")
}

fn forget_bucket(group_jid: &str) -> String {
    format!("forget:{group_jid}")
}

fn base_key_id(address: &str, message_id: &str) -> Vec<u8> {
    format!("{address}\0{message_id}").into_bytes()
}

/// Mapping fields other than the LID itself.
type MappingRow = (String, i64, i64, String);

fn decode_mapping(lid: String, raw: &[u8]) -> Result<LidPnMappingEntry> {
    let (phone_number, created_at, updated_at, learning_source): MappingRow =
        bincode::deserialize(raw).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(LidPnMappingEntry {
        lid,
        phone_number,
        created_at,
        updated_at,
        learning_source,
    })
}

#[async_trait]
impl ProtocolStore for SessionStore {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        let rows = self.scan(&skdm_bucket(group_jid)).await.map_err(db_err)?;
        Ok(rows.into_iter().map(|(k, _)| key_string(k)).collect())
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        let records: Vec<(&[u8], Vec<u8>)> = device_jids
            .iter()
            .map(|d| (d.as_bytes(), Vec::new()))
            .collect();
        self.put_many(&skdm_bucket(group_jid), records)
            .await
            .map_err(db_err)
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        self.clear(&skdm_bucket(group_jid)).await.map_err(db_err)
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        match self.get(LID, lid.as_bytes()).await.map_err(db_err)? {
            Some(raw) => decode_mapping(lid.to_string(), &raw).map(Some),
            None => Ok(None),
        }
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        let Some(lid) = self.get(PN_INDEX, phone.as_bytes()).await.map_err(db_err)? else {
            return Ok(None);
        };
        self.get_lid_mapping(&key_string(lid)).await
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        let row: MappingRow = (
            entry.phone_number.clone(),
            entry.created_at,
            entry.updated_at,
            entry.learning_source.clone(),
        );
        let raw = bincode::serialize(&row).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(LID, entry.lid.as_bytes(), &raw)
            .await
            .map_err(db_err)?;
        self.put(PN_INDEX, entry.phone_number.as_bytes(), entry.lid.as_bytes())
            .await
            .map_err(db_err)
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        let rows = self.scan(LID).await.map_err(db_err)?;
        rows.into_iter()
            .map(|(lid, raw)| decode_mapping(key_string(lid), &raw))
            .collect()
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        self.put(BASE_KEY, &base_key_id(address, message_id), base_key)
            .await
            .map_err(db_err)
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        let stored = self
            .get(BASE_KEY, &base_key_id(address, message_id))
            .await
            .map_err(db_err)?;
        Ok(stored.is_some_and(|k| k == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        self.delete(BASE_KEY, &base_key_id(address, message_id))
            .await
            .map_err(db_err)
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        let raw =
            serde_json::to_vec(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.put(DEVICE_LIST, record.user.as_bytes(), &raw)
            .await
            .map_err(db_err)
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        match self.get(DEVICE_LIST, user.as_bytes()).await.map_err(db_err)? {
            Some(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        self.put(&forget_bucket(group_jid), participant.as_bytes(), &[])
            .await
            .map_err(db_err)
    }

    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let rows = self.take(&forget_bucket(group_jid)).await.map_err(db_err)?;
        Ok(rows.into_iter().map(|(k, _)| key_string(k)).collect())
    }
}
