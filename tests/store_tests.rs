//! Token store persistence: first-use bootstrap, atomic whole-document
//! rewrites, corruption reporting and the one-live-token invariant.

use anyhow::Result;
use tempfile::tempdir;

use portalgate::store::{
    find_by_email, find_by_token, IdentityMap, IdentityRecord, SharedTokenStore, StoreError,
    TokenStore,
};

fn record_with_token(token: &str) -> IdentityRecord {
    IdentityRecord { session_token: Some(token.to_string()), ..Default::default() }
}

#[test]
fn missing_store_reads_as_empty_and_is_not_created() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("token.json");
    let store = TokenStore::new(&path);

    let map = store.read()?;
    assert!(map.is_empty());
    assert!(!path.exists(), "read must not create the backing file");
    Ok(())
}

#[test]
fn corrupt_store_is_reported_not_masked_as_empty() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("token.json");
    std::fs::write(&path, "{ this is not an identity document")?;
    let store = TokenStore::new(&path);

    match store.read() {
        Err(StoreError::Corrupt { .. }) => {}
        other => panic!("expected corruption to surface, got {other:?}"),
    }
    Ok(())
}

#[test]
fn write_replaces_the_whole_document_and_leaves_no_temp_files() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("token.json");
    let store = TokenStore::new(&path);

    let mut first = IdentityMap::new();
    first.insert("a@x.com".into(), record_with_token("t1"));
    store.write(&first)?;

    let mut second = IdentityMap::new();
    second.insert("b@x.com".into(), record_with_token("t2"));
    store.write(&second)?;

    let map = store.read()?;
    assert!(find_by_email(&map, "a@x.com").is_none(), "old document must be gone");
    assert_eq!(map.get("b@x.com"), Some(&record_with_token("t2")));

    let names: Vec<String> = std::fs::read_dir(tmp.path())?
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["token.json".to_string()], "no temp files may survive a write");
    Ok(())
}

#[test]
fn every_persisted_state_parses_as_a_complete_document() -> Result<()> {
    let tmp = tempdir()?;
    let path = tmp.path().join("token.json");
    let store = TokenStore::new(&path);

    let mut map = IdentityMap::new();
    for i in 0..20 {
        map.insert(format!("user{i}@x.com"), record_with_token(&format!("tok{i}")));
        store.write(&map)?;
        // The raw file must be valid at every observation point.
        let raw = std::fs::read_to_string(&path)?;
        let parsed: IdentityMap = serde_json::from_str(&raw)?;
        assert_eq!(parsed.len(), i + 1);
    }
    Ok(())
}

#[test]
fn second_token_invalidates_the_first() -> Result<()> {
    let tmp = tempdir()?;
    let store = TokenStore::new(tmp.path().join("token.json"));

    let mut map = IdentityMap::new();
    map.insert("a@x.com".into(), record_with_token("first"));
    store.write(&map)?;

    let mut map = store.read()?;
    map.insert("a@x.com".into(), record_with_token("second"));
    store.write(&map)?;

    let map = store.read()?;
    assert!(find_by_token(&map, "first").is_none(), "overwritten token must be dead");
    let (email, _) = find_by_token(&map, "second").expect("current token must resolve");
    assert_eq!(email, "a@x.com");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_serialize_under_the_shared_handle() -> Result<()> {
    let tmp = tempdir()?;
    let store = SharedTokenStore::new(tmp.path().join("token.json"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let guard = store.0.lock();
            let mut map = guard.read().unwrap();
            map.insert(format!("user{i}@x.com"), record_with_token(&format!("tok{i}")));
            guard.write(&map).unwrap();
        }));
    }
    for h in handles {
        h.await?;
    }

    let guard = store.0.lock();
    let map = guard.read()?;
    assert_eq!(map.len(), 8, "no concurrent login result may be dropped");
    Ok(())
}
