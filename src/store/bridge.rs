use std::sync::Arc;

use parking_lot::RwLock;

use super::{KeyValueStore, StorageError};

const ENTRY_SEP: char = '|';
const KV_SEP: char = ':';

/// Key-value storage packed into one `key:value|key:value` string.
///
/// This is the format an embedding WebView host exchanges with the page, so
/// the whole store can be handed across with [`BridgeStore::snapshot`] and
/// seeded back with [`BridgeStore::from_bridge_string`].
#[derive(Clone, Default)]
pub struct BridgeStore {
    inner: Arc<RwLock<String>>,
}

impl BridgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bridge_string(s: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(s.trim().to_string())),
        }
    }

    /// Current bridge string.
    pub fn snapshot(&self) -> String {
        self.inner.read().clone()
    }
}

fn decode(s: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for entry in s.split(ENTRY_SEP) {
        let Some((k, v)) = entry.split_once(KV_SEP) else {
            continue;
        };
        if k.is_empty() {
            continue;
        }
        // Later duplicates win, keeping the first position.
        match out.iter_mut().find(|(key, _)| key == k) {
            Some(slot) => slot.1 = v.to_string(),
            None => out.push((k.to_string(), v.to_string())),
        }
    }
    out
}

fn encode(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(k, v)| format!("{k}{KV_SEP}{v}"))
        .collect::<Vec<_>>()
        .join(&ENTRY_SEP.to_string())
}

fn check_entry(key: &str, value: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.contains(KV_SEP) || key.contains(ENTRY_SEP) {
        return Err(StorageError::InvalidEntry(format!("bridge key {key:?}")));
    }
    if value.contains(ENTRY_SEP) {
        return Err(StorageError::InvalidEntry(format!(
            "bridge value for {key} contains '{ENTRY_SEP}'"
        )));
    }
    Ok(())
}

impl KeyValueStore for BridgeStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let s = self.inner.read();
        Ok(decode(&s).into_iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_entry(key, value)?;
        let mut s = self.inner.write();
        let mut entries = decode(&s);
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
        *s = encode(&entries);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut s = self.inner.write();
        let mut entries = decode(&s);
        entries.retain(|(k, _)| k != key);
        *s = encode(&entries);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.inner.write().clear();
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_appends_and_overwrites_in_place() {
        let store = BridgeStore::new();
        store.set_item("access_token", "A1").unwrap();
        store.set_item("refresh_token", "R1").unwrap();
        assert_eq!(store.snapshot(), "access_token:A1|refresh_token:R1");

        store.set_item("access_token", "A2").unwrap();
        assert_eq!(store.snapshot(), "access_token:A2|refresh_token:R1");
    }

    #[test]
    fn test_remove_and_clear() {
        let store = BridgeStore::from_bridge_string("access_token:A1|refresh_token:R1|theme:dark");
        store.remove_item("refresh_token").unwrap();
        assert_eq!(store.snapshot(), "access_token:A1|theme:dark");
        assert_eq!(store.get_item("refresh_token").unwrap(), None);

        store.clear().unwrap();
        assert_eq!(store.snapshot(), "");
        assert_eq!(store.get_item("access_token").unwrap(), None);
    }

    #[test]
    fn test_value_may_contain_colon() {
        let store = BridgeStore::new();
        store.set_item("last_login", "2024-01-01 09:15:00").unwrap();
        assert_eq!(
            store.get_item("last_login").unwrap().as_deref(),
            Some("2024-01-01 09:15:00")
        );
    }

    #[test]
    fn test_rejects_separator_in_entry() {
        let store = BridgeStore::new();
        assert!(store.set_item("a|b", "x").is_err());
        assert!(store.set_item("a:b", "x").is_err());
        assert!(store.set_item("a", "x|y").is_err());
        assert_eq!(store.snapshot(), "");
    }

    #[test]
    fn test_malformed_segments_are_skipped() {
        let store = BridgeStore::from_bridge_string("garbage||access_token:A1|:nokey");
        assert_eq!(store.get_item("access_token").unwrap().as_deref(), Some("A1"));
        store.set_item("refresh_token", "R1").unwrap();
        assert_eq!(store.snapshot(), "access_token:A1|refresh_token:R1");
    }

    #[test]
    fn test_clones_share_state() {
        let store = BridgeStore::new();
        let other = store.clone();
        store.set_item("access_token", "A1").unwrap();
        assert_eq!(other.get_item("access_token").unwrap().as_deref(), Some("A1"));
    }
}
