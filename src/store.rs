use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use async_broadcast::{InactiveReceiver, Receiver, Sender, TrySendError};
use log::{debug, error, warn};
use rocket::response::stream::{Event, EventStream};
use rocket::{Build, Rocket, State};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKey {
    Reservations,
    Classes,
    Borrows,
}

impl CollectionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKey::Reservations => "reservations",
            CollectionKey::Classes => "classes",
            CollectionKey::Borrows => "borrows",
        }
    }
}

impl Display for CollectionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Versioned {
    pub data: String,
    pub version: i64,
}

/// The write was based on a version that is no longer current.
#[derive(Debug)]
pub struct StaleVersion {
    pub key: String,
    pub expected: i64,
}

impl Display for StaleVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Collection '{}' was modified concurrently, expected version {}", self.key, self.expected)
    }
}

impl std::error::Error for StaleVersion {}

/// Named text blobs with a version stamp per key. Version 0 means the key was never written.
#[rocket::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>>;
    /// Replaces the blob when the stored version equals `expected_version`,
    /// fails with [`StaleVersion`] otherwise. Returns the new version.
    async fn put(&self, key: &str, data: String, expected_version: i64) -> anyhow::Result<i64>;
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Versioned>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_raw(self, key: &str, data: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            let version = entries.get(key).map(|v| v.version).unwrap_or(0) + 1;
            entries.insert(key.to_string(), Versioned { data: data.to_string(), version });
        }
        self
    }
}

#[cfg(test)]
#[rocket::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>> {
        let entries = self.entries.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(entries.get(key).cloned())
    }
    async fn put(&self, key: &str, data: String, expected_version: i64) -> anyhow::Result<i64> {
        let mut entries = self.entries.lock().map_err(|e| anyhow::anyhow!("{e}"))?;
        let current = entries.get(key).map(|v| v.version).unwrap_or(0);
        if current != expected_version {
            return Err(StaleVersion { key: key.to_string(), expected: expected_version }.into());
        }
        let version = current + 1;
        entries.insert(key.to_string(), Versioned { data, version });
        Ok(version)
    }
}

#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub records: Vec<T>,
    pub version: i64,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { records: Vec::new(), version: 0 }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CollectionChange {
    pub key: CollectionKey,
    pub version: i64,
}

/// Typed access to the persisted collections. The only place stored JSON is touched.
pub struct Repository {
    store: Arc<dyn KeyValueStore>,
    changes_sender: Sender<CollectionChange>,
    changes_receiver: InactiveReceiver<CollectionChange>,
}

impl Repository {
    pub fn new(store: impl KeyValueStore + 'static) -> Self {
        let (mut sender, receiver) = async_broadcast::broadcast(64);
        sender.set_overflow(true);
        Self {
            store: Arc::new(store),
            changes_sender: sender,
            changes_receiver: receiver.deactivate(),
        }
    }

    /// Never fails: a missing key, an unreadable store or corrupt JSON all give an empty collection.
    pub async fn load<T: DeserializeOwned>(&self, key: CollectionKey) -> Collection<T> {
        match self.store.get(key.as_str()).await {
            Ok(Some(blob)) => Collection {
                records: decode_records(key, &blob.data),
                version: blob.version,
            },
            Ok(None) => Collection::default(),
            Err(e) => {
                error!("Read collection {key} error: {e}");
                Collection::default()
            }
        }
    }

    /// Writes the whole collection, the write is rejected when someone else saved it since it was loaded.
    pub async fn save<T: Serialize>(&self, key: CollectionKey, collection: &mut Collection<T>) -> anyhow::Result<()> {
        let data = serde_json::to_string(&collection.records)?;
        let version = self.store.put(key.as_str(), data, collection.version).await?;
        collection.version = version;
        self.broadcast_change(CollectionChange { key, version });
        Ok(())
    }

    /// Hands out the next id of a collection from a counter stored beside it, so an id is
    /// never given twice even after the record holding it was deleted. `floor` is the highest
    /// id present in the collection, the result is always above it.
    pub async fn next_id(&self, key: CollectionKey, floor: i64) -> anyhow::Result<i64> {
        let counter_key = format!("{key}.next_id");
        let (next, version) = match self.store.get(&counter_key).await? {
            Some(blob) => (blob.data.trim().parse::<i64>().unwrap_or_else(|e| {
                warn!("Counter {counter_key} unreadable, restarting from {}: {e}", floor + 1);
                0
            }), blob.version),
            None => (0, 0),
        };
        let id = next.max(floor + 1).max(1);
        self.store.put(&counter_key, (id + 1).to_string(), version).await?;
        Ok(id)
    }

    pub fn subscribe(&self) -> Receiver<CollectionChange> {
        self.changes_receiver.activate_cloned()
    }

    fn broadcast_change(&self, change: CollectionChange) {
        match self.changes_sender.try_broadcast(change) {
            Ok(_) | Err(TrySendError::Inactive(_)) => {}
            Err(e) => debug!("Collection change not broadcast: {e}"),
        }
    }
}

fn decode_records<T: DeserializeOwned>(key: CollectionKey, data: &str) -> Vec<T> {
    let values = match serde_json::from_str::<Vec<Value>>(data) {
        Ok(values) => values,
        Err(e) => {
            warn!("Collection {key} is not a JSON array, starting empty: {e}");
            return Vec::new();
        }
    };
    values.into_iter()
        .enumerate()
        .filter_map(|(ix, value)| {
            if !value.is_object() {
                warn!("Collection {key} record #{ix} is not an object, skipping it");
                return None;
            }
            serde_json::from_value(value)
                .map_err(|e| warn!("Collection {key} record #{ix} unreadable, skipping it: {e}"))
                .ok()
        })
        .collect()
}

#[get("/api/changes/sse")]
fn changes_sse(repo: &State<Repository>) -> EventStream![] {
    let mut chng_receiver = repo.subscribe();
    EventStream! {
        loop {
            let change = match chng_receiver.recv().await {
                Ok(chng) => chng,
                Err(async_broadcast::RecvError::Overflowed(n)) => {
                    warn!("Change feed subscriber lagging, {n} changes skipped");
                    continue;
                }
                Err(e) => {
                    error!("Read collection change error: {e}");
                    break;
                }
            };
            match serde_json::to_string(&change) {
                Ok(json) => {
                    yield Event::data(json);
                }
                Err(e) => {
                    error!("Serde error: {e}");
                    break;
                }
            }
        }
    }
}

pub fn extend(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/", routes![
        changes_sse,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use crate::lifecycle::ReservationStatus;
    use crate::reservation::Reservation;
    use crate::reservation::test::reservation;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Item {
        name: String,
    }

    #[rocket::async_test]
    async fn test_missing_collection_is_empty() {
        let repo = Repository::new(MemoryStore::default());
        let coll = repo.load::<Item>(CollectionKey::Reservations).await;
        assert!(coll.records.is_empty());
        assert_eq!(coll.version, 0);
    }

    #[rocket::async_test]
    async fn test_corrupt_collection_is_empty() {
        let repo = Repository::new(MemoryStore::default().with_raw("reservations", "{not json"));
        let coll = repo.load::<Item>(CollectionKey::Reservations).await;
        assert!(coll.records.is_empty());
        assert_eq!(coll.version, 1);

        let repo = Repository::new(MemoryStore::default().with_raw("reservations", "null"));
        assert!(repo.load::<Item>(CollectionKey::Reservations).await.records.is_empty());
    }

    #[rocket::async_test]
    async fn test_corrupt_reservations_load_empty() {
        let repo = Repository::new(MemoryStore::default().with_raw("reservations", "{not json"));
        let coll = repo.load::<Reservation>(CollectionKey::Reservations).await;
        assert!(coll.records.is_empty());
        assert_eq!(coll.version, 1);

        let mut coll = coll;
        coll.records.push(reservation("1", "Alice", "2025-06-10", "09:00", "10:00", ReservationStatus::Pending));
        repo.save(CollectionKey::Reservations, &mut coll).await.unwrap();
        let reloaded = repo.load::<Reservation>(CollectionKey::Reservations).await;
        assert_eq!(reloaded.records, coll.records);
    }

    #[rocket::async_test]
    async fn test_next_id_is_never_reused() {
        let repo = Repository::new(MemoryStore::default());
        assert_eq!(repo.next_id(CollectionKey::Classes, 0).await.unwrap(), 1);
        assert_eq!(repo.next_id(CollectionKey::Classes, 1).await.unwrap(), 2);
        // highest record deleted, the floor drops but the counter does not
        assert_eq!(repo.next_id(CollectionKey::Classes, 1).await.unwrap(), 3);
        // records written before the counter existed
        assert_eq!(repo.next_id(CollectionKey::Classes, 10).await.unwrap(), 11);
        assert_eq!(repo.next_id(CollectionKey::Classes, 0).await.unwrap(), 12);
    }

    #[rocket::async_test]
    async fn test_next_id_starts_above_existing_records() {
        let repo = Repository::new(MemoryStore::default().with_raw("classes.next_id", "garbage"));
        assert_eq!(repo.next_id(CollectionKey::Classes, 4).await.unwrap(), 5);
        assert_eq!(repo.next_id(CollectionKey::Classes, 4).await.unwrap(), 6);
    }

    #[rocket::async_test]
    async fn test_non_object_records_are_skipped() {
        let repo = Repository::new(MemoryStore::default()
            .with_raw("classes", r#"[{"name": "a"}, 42, "x", {"name": "b"}]"#));
        let coll = repo.load::<Item>(CollectionKey::Classes).await;
        assert_eq!(coll.records, vec![Item { name: "a".into() }, Item { name: "b".into() }]);
    }

    #[rocket::async_test]
    async fn test_save_then_load() {
        let repo = Repository::new(MemoryStore::default());
        let mut coll = repo.load::<Item>(CollectionKey::Borrows).await;
        coll.records.push(Item { name: "camera".into() });
        repo.save(CollectionKey::Borrows, &mut coll).await.unwrap();
        assert_eq!(coll.version, 1);
        let reloaded = repo.load::<Item>(CollectionKey::Borrows).await;
        assert_eq!(reloaded.records, coll.records);
        assert_eq!(reloaded.version, 1);
    }

    #[rocket::async_test]
    async fn test_stale_write_is_rejected() {
        let repo = Repository::new(MemoryStore::default());
        let mut first = repo.load::<Item>(CollectionKey::Borrows).await;
        let mut second = repo.load::<Item>(CollectionKey::Borrows).await;
        first.records.push(Item { name: "tripod".into() });
        repo.save(CollectionKey::Borrows, &mut first).await.unwrap();
        second.records.push(Item { name: "mic".into() });
        let err = repo.save(CollectionKey::Borrows, &mut second).await.unwrap_err();
        assert!(err.downcast_ref::<StaleVersion>().is_some());
        let stored = repo.load::<Item>(CollectionKey::Borrows).await;
        assert_eq!(stored.records, vec![Item { name: "tripod".into() }]);
    }

    #[rocket::async_test]
    async fn test_save_broadcasts_change() {
        let repo = Repository::new(MemoryStore::default());
        let mut receiver = repo.subscribe();
        let mut coll = Collection::<Item>::default();
        repo.save(CollectionKey::Classes, &mut coll).await.unwrap();
        let change = receiver.recv().await.unwrap();
        assert_eq!(change, CollectionChange { key: CollectionKey::Classes, version: 1 });
    }
}
