use super::*;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("medhasmind-token-{}", uuid::Uuid::new_v4()))
}

// =============================================================================
// origin_file_stem
// =============================================================================

#[test]
fn origin_stem_strips_scheme_and_slash() {
    assert_eq!(origin_file_stem("https://abc.supabase.co/"), "abc.supabase.co");
}

#[test]
fn origin_stem_replaces_unsafe_chars() {
    assert_eq!(origin_file_stem("http://localhost:8000"), "localhost_8000");
}

#[test]
fn origin_stem_empty_falls_back() {
    assert_eq!(origin_file_stem("https://"), "default");
}

// =============================================================================
// FileTokenStore
// =============================================================================

#[test]
fn file_store_missing_file_is_empty() {
    let store = FileTokenStore::for_origin(scratch_dir(), "https://a.test");
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn file_store_save_load_clear() {
    let dir = scratch_dir();
    let store = FileTokenStore::for_origin(&dir, "https://a.test");
    store.save("tok-1").unwrap();
    assert_eq!(store.load().unwrap().as_deref(), Some("tok-1"));

    let reopened = FileTokenStore::for_origin(&dir, "https://a.test");
    assert_eq!(reopened.load().unwrap().as_deref(), Some("tok-1"));

    reopened.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn file_store_is_scoped_by_origin() {
    let dir = scratch_dir();
    let a = FileTokenStore::for_origin(&dir, "https://a.test");
    let b = FileTokenStore::for_origin(&dir, "https://b.test");
    a.save("tok-a").unwrap();
    assert_eq!(b.load().unwrap(), None);
    assert_ne!(a.path(), b.path());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn file_store_clear_without_file_is_ok() {
    let store = FileTokenStore::for_origin(scratch_dir(), "https://a.test");
    assert!(store.clear().is_ok());
}

#[test]
fn file_store_corrupt_file_is_storage_error() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    let store = FileTokenStore::for_origin(&dir, "https://a.test");
    std::fs::write(store.path(), "{not json").unwrap();
    assert!(matches!(store.load(), Err(GatewayError::Storage(_))));
    let _ = std::fs::remove_dir_all(dir);
}

// =============================================================================
// MemoryTokenStore
// =============================================================================

#[test]
fn memory_store_last_write_wins() {
    let store = MemoryTokenStore::new();
    store.save("one").unwrap();
    store.save("two").unwrap();
    assert_eq!(store.load().unwrap().as_deref(), Some("two"));
    store.clear().unwrap();
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn memory_store_seeded_token() {
    let store = MemoryTokenStore::with_token("seed");
    assert_eq!(store.load().unwrap().as_deref(), Some("seed"));
}
