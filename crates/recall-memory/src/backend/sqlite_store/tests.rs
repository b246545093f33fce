use super::*;
use tempfile::TempDir;
use tracing_test::traced_test;

/// Clock that always reports the same instant.
struct FrozenClock(i64);

impl Clock for FrozenClock {
    fn now_nanos(&self) -> i64 {
        self.0
    }
}

async fn memory_store(max_rows: usize) -> SqliteMemoryBackend {
    let settings = SqliteSettings {
        max_rows_per_session: max_rows,
        ..SqliteSettings::at(IN_MEMORY_PATH)
    };
    SqliteMemoryBackend::open(&settings, Arc::new(InMemoryBackend::new())).await
}

async fn file_store() -> (SqliteMemoryBackend, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("chat.sqlite");
    let store =
        SqliteMemoryBackend::open(&SqliteSettings::at(&db_path), Arc::new(InMemoryBackend::new()))
            .await;
    (store, temp_dir)
}

#[tokio::test]
async fn test_roundtrip_newest_first() {
    let store = memory_store(10_000).await;
    assert!(!store.using_fallback());

    store.add_turn("user", "hi", "default").await;
    store.add_turn("assistant", "hello", "default").await;

    let turns = store.get_recent(10, "default").await;
    assert_eq!(turns, vec![Turn::assistant("hello"), Turn::user("hi")]);
    assert!(store.fallback().get_recent(10, "default").await.is_empty());
}

#[tokio::test]
async fn test_trim_keeps_newest_rows() {
    let store = memory_store(3).await;
    for i in 0..6 {
        store.add_turn("user", &format!("msg{i}"), "default").await;
    }

    let rows = store.get_recent(10, "default").await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].content, "msg5");
    assert_eq!(rows[2].content, "msg3");
    assert!(!store.using_fallback());
}

#[tokio::test]
async fn test_capacity_bound_under_load() {
    let store = memory_store(50).await;
    for i in 0..60 {
        store.add_turn("user", &format!("turn {i}"), "bulk").await;
    }

    let rows = store.get_recent(60, "bulk").await;
    assert_eq!(rows.len(), 50);
    assert_eq!(rows[0].content, "turn 59");
    assert_eq!(rows[49].content, "turn 10");
}

#[tokio::test]
async fn test_trim_is_per_session() {
    let store = memory_store(2).await;
    for i in 0..4 {
        store.add_turn("user", &format!("a{i}"), "a").await;
    }
    store.add_turn("user", "b0", "b").await;

    assert_eq!(store.get_recent(10, "a").await.len(), 2);
    assert_eq!(store.get_recent(10, "b").await, vec![Turn::user("b0")]);
}

#[tokio::test]
async fn test_flush_and_idempotence() {
    let store = memory_store(10_000).await;
    store.flush("default").await;

    store.add_turn("user", "bye", "default").await;
    store.flush("default").await;
    store.flush("default").await;

    assert!(store.get_recent(5, "default").await.is_empty());
    assert!(!store.using_fallback());
}

#[tokio::test]
async fn test_zero_limit_returns_nothing() {
    let store = memory_store(10).await;
    store.add_turn("user", "x", "default").await;
    assert!(store.get_recent(0, "default").await.is_empty());
}

#[tokio::test]
async fn test_ephemeral_mode_serves_from_fallback() {
    let settings = SqliteSettings {
        persist: false,
        ..SqliteSettings::at(IN_MEMORY_PATH)
    };
    let store = SqliteMemoryBackend::open(&settings, Arc::new(InMemoryBackend::new())).await;

    store.add_turn("user", "ping", "default").await;
    store.add_turn("assistant", "pong", "default").await;

    let turns = store.get_recent(10, "default").await;
    assert_eq!(turns, vec![Turn::assistant("pong"), Turn::user("ping")]);
    assert_eq!(store.fallback().get_recent(10, "default").await.len(), 2);
    assert!(!store.using_fallback());
}

#[tokio::test]
async fn test_ephemeral_mode_still_creates_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ephemeral.sqlite");
    let settings = SqliteSettings {
        persist: false,
        ..SqliteSettings::at(&db_path)
    };
    let store = SqliteMemoryBackend::open(&settings, Arc::new(InMemoryBackend::new())).await;
    store.add_turn("user", "transient", "default").await;

    let pool = SqlitePool::connect(&format!("sqlite:{}", db_path.display()))
        .await
        .unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turns")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_file_database_persists_across_instances() {
    let (store, temp) = file_store().await;
    assert!(!store.using_fallback());
    store.add_turn("user", "remember me", "s1").await;
    let path = store.path().to_path_buf();
    drop(store);

    let reopened =
        SqliteMemoryBackend::open(&SqliteSettings::at(&path), Arc::new(InMemoryBackend::new()))
            .await;
    assert_eq!(
        reopened.get_recent(1, "s1").await,
        vec![Turn::user("remember me")]
    );
    drop(temp);
}

#[tokio::test]
async fn test_content_stored_as_plain_text() {
    let (store, _temp) = file_store().await;
    store.add_turn("user", "hi \"there\"", "default").await;

    let pool = store.pool().unwrap();
    let (content,): (String,) = sqlx::query_as("SELECT content FROM turns")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(content, "hi \"there\"");
}

#[tokio::test]
#[traced_test]
async fn test_fallback_on_unwritable_path() {
    let temp_dir = TempDir::new().unwrap();
    // A regular file where the parent directory should be
    let blocker = temp_dir.path().join("locked");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let fallback = Arc::new(InMemoryBackend::new());
    let store =
        SqliteMemoryBackend::open(&SqliteSettings::at(blocker.join("chat.sqlite")), fallback.clone())
            .await;

    assert!(store.using_fallback());
    assert!(logs_contain("SQLite unavailable"));

    store.add_turn("user", "hello", "default").await;
    assert_eq!(fallback.get_recent(1, "default").await[0].content, "hello");
    assert_eq!(store.get_recent(1, "default").await, vec![Turn::user("hello")]);
}

#[tokio::test]
#[traced_test]
async fn test_timestamp_collision_degrades_to_fallback() {
    let fallback = Arc::new(InMemoryBackend::new());
    let store = SqliteMemoryBackend::open_with_clock(
        &SqliteSettings::at(IN_MEMORY_PATH),
        fallback.clone(),
        Arc::new(FrozenClock(42)),
    )
    .await;

    store.add_turn("user", "first", "default").await;
    assert!(!store.using_fallback());

    store.add_turn("user", "second", "default").await;
    assert!(store.using_fallback());
    assert!(logs_contain("SQLite operation failed"));

    // The failed write is served from RAM; the earlier row stays on disk
    assert_eq!(fallback.get_recent(5, "default").await, vec![Turn::user("second")]);
    assert_eq!(store.get_recent(5, "default").await, vec![Turn::user("second")]);
}

#[tokio::test]
async fn test_collision_does_not_break_other_sessions_until_degraded() {
    let store = SqliteMemoryBackend::open_with_clock(
        &SqliteSettings::at(IN_MEMORY_PATH),
        Arc::new(InMemoryBackend::new()),
        Arc::new(FrozenClock(7)),
    )
    .await;

    // Same ts, different session: no primary-key conflict
    store.add_turn("user", "a", "one").await;
    store.add_turn("user", "b", "two").await;
    assert!(!store.using_fallback());
    assert_eq!(store.get_recent(5, "two").await, vec![Turn::user("b")]);
}

#[test]
fn test_monotonic_clock_never_repeats() {
    let clock = MonotonicClock::default();
    let mut prev = clock.now_nanos();
    for _ in 0..10_000 {
        let next = clock.now_nanos();
        assert!(next > prev);
        prev = next;
    }
}

#[tokio::test]
async fn test_concurrent_writers_keep_every_turn() {
    let (store, _temp) = file_store().await;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for worker in 0..4 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            for i in 0..10 {
                store
                    .add_turn("user", &format!("w{worker}-{i}"), "shared")
                    .await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get_recent(100, "shared").await.len(), 40);
}

#[tokio::test]
#[traced_test]
async fn test_zero_capacity_keeps_latest_turn() {
    let store = memory_store(0).await;
    assert!(!store.using_fallback());
    assert!(logs_contain("max_rows_per_session is 0"));

    store.add_turn("user", "first", "s").await;
    store.add_turn("user", "second", "s").await;

    assert_eq!(store.get_recent(10, "s").await, vec![Turn::user("second")]);
}
