use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use super::*;

#[tokio::test]
async fn stores_overwrites_and_removes_items() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.get_item("grid").await.expect("get"), None);

    storage.set_item("grid", "{\"v\":1}").await.expect("set");
    storage.set_item("grid", "{\"v\":2}").await.expect("overwrite");
    assert_eq!(
        storage.get_item("grid").await.expect("get").as_deref(),
        Some("{\"v\":2}")
    );
    assert_eq!(storage.list_keys().await.expect("keys"), vec!["grid"]);

    storage.remove_item("grid").await.expect("remove");
    assert_eq!(storage.get_item("grid").await.expect("get"), None);
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing_and_reopens_it() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("planner.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    storage.set_item("selectedPlatform", "corvette").await.expect("set");
    storage.pool().close().await;
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );

    let reopened = Storage::new(&database_url).await.expect("reopen");
    assert_eq!(
        reopened
            .get_item("selectedPlatform")
            .await
            .expect("get")
            .as_deref(),
        Some("corvette")
    );
}

#[tokio::test]
async fn memory_store_round_trips() {
    let store = MemoryStore::new();
    store.set_item("a", "1").await.expect("set");
    assert_eq!(store.len().await, 1);
    store.remove_item("a").await.expect("remove");
    assert!(store.is_empty().await);
}

#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    writes: AtomicUsize,
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn debounced_writer_coalesces_to_last_value() {
    let store = Arc::new(CountingStore::default());
    let writer = DebouncedWriter::new(store.clone(), "grid", Duration::from_millis(500));

    writer.schedule("first".into());
    tokio::time::sleep(Duration::from_millis(300)).await;
    writer.schedule("second".into());
    tokio::time::sleep(Duration::from_millis(300)).await;
    writer.schedule("third".into());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert!(writer.has_pending());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.get_item("grid").await.expect("get").as_deref(),
        Some("third")
    );
    assert!(!writer.has_pending());
}

#[tokio::test(start_paused = true)]
async fn flush_writes_immediately_and_disarms_timer() {
    let store = Arc::new(CountingStore::default());
    let writer = DebouncedWriter::new(store.clone(), "grid", Duration::from_millis(500));

    writer.schedule("now".into());
    writer.flush().await.expect("flush");
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    writer.flush().await.expect("flush with nothing pending");
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_and_clear_drop_pending_values() {
    let store = Arc::new(CountingStore::default());
    store.set_item("techBonusState", "old").await.expect("seed");
    let writer = DebouncedWriter::new(store.clone(), "techBonusState", Duration::from_millis(500));

    writer.schedule("never".into());
    writer.cancel();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        store.get_item("techBonusState").await.expect("get").as_deref(),
        Some("old")
    );

    writer.schedule("also never".into());
    writer.clear().await.expect("clear");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(store.get_item("techBonusState").await.expect("get"), None);
    assert_eq!(writer.key(), "techBonusState");
}

/// Store whose writes take 100ms to land.
#[derive(Default)]
struct SlowStore {
    inner: MemoryStore,
}

#[async_trait]
impl KeyValueStore for SlowStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.inner.set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.inner.remove_item(key).await
    }
}

#[tokio::test(start_paused = true)]
async fn clear_waits_for_timer_write_in_progress() {
    let store = Arc::new(SlowStore::default());
    let writer = DebouncedWriter::new(store.clone(), "grid", Duration::from_millis(500));

    writer.schedule("stale".into());
    tokio::time::sleep(Duration::from_millis(550)).await;
    writer.clear().await.expect("clear");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.get_item("grid").await.expect("get"), None);
    assert!(!writer.has_pending());
}

#[tokio::test(start_paused = true)]
async fn flush_lands_after_timer_write_in_progress() {
    let store = Arc::new(SlowStore::default());
    let writer = DebouncedWriter::new(store.clone(), "grid", Duration::from_millis(500));

    writer.schedule("older".into());
    tokio::time::sleep(Duration::from_millis(550)).await;
    writer.schedule("newer".into());
    writer.flush().await.expect("flush");
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(
        store.get_item("grid").await.expect("get").as_deref(),
        Some("newer")
    );
}
