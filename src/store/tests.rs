use super::*;
use crate::crypto::Sealed;

fn in_memory_store() -> SqliteProviderStore {
    SqliteProviderStore::new(":memory:").expect("in-memory store failed")
}

fn sample_record(name: &str) -> ProviderRecord {
    let mut record = ProviderRecord::new(name);
    record.display_name = format!("{} login", name);
    record.client_id = format!("{}-client", name);
    record.scopes = "openid email".to_string();
    record.auth_url = "https://idp.example.com/authorize".to_string();
    record.token_url = "https://idp.example.com/token".to_string();
    record
}

fn sealed(tag: &str) -> Sealed {
    Sealed {
        ciphertext: format!("ct-{}", tag),
        key_id: format!("key-{}", tag),
    }
}

#[test]
fn test_create_and_get() {
    let store = in_memory_store();
    let mut record = sample_record("github");
    record.auth_style = AuthStyle::IN_HEADER;
    record.status = ProviderStatus(7);
    record.extra_config = serde_json::json!({"team": "core"}).as_object().cloned();

    let id = store.create(&record).expect("create failed");
    let loaded = store.get(id).expect("get failed");

    assert_eq!(loaded.id, id);
    assert_eq!(loaded.name, "github");
    assert_eq!(loaded.client_id, "github-client");
    assert_eq!(loaded.auth_style, AuthStyle::IN_HEADER);
    // Unknown status values survive storage untouched
    assert_eq!(loaded.status, ProviderStatus(7));
    assert_eq!(loaded.extra_config.unwrap()["team"], "core");
    assert!(loaded.enabled);
    assert!(loaded.last_used_at.is_none());
}

#[test]
fn test_get_nonexistent() {
    let store = in_memory_store();
    assert!(matches!(store.get(42), Err(StoreError::NotFound(_))));
}

#[test]
fn test_duplicate_name_conflicts() {
    let store = in_memory_store();
    store.create(&sample_record("github")).unwrap();

    let result = store.create(&sample_record("github"));
    assert!(matches!(result, Err(StoreError::Conflict(name)) if name == "github"));
}

#[test]
fn test_get_by_name() {
    let store = in_memory_store();
    store.create(&sample_record("github")).unwrap();
    let id = store.create(&sample_record("gitlab")).unwrap();

    assert_eq!(store.get_by_name("gitlab").unwrap().id, id);
    assert!(matches!(store.get_by_name("git"), Err(StoreError::NotFound(_))));
}

#[test]
fn test_update_leaves_absent_fields_untouched() {
    let store = in_memory_store();
    let mut record = sample_record("github");
    record.encrypted_secret = "ct".to_string();
    record.encryption_key_id = "k1".to_string();
    let id = store.create(&record).unwrap();

    let patch = ProviderPatch {
        display_name: Some("GitHub".to_string()),
        enabled: Some(false),
        ..ProviderPatch::default()
    };
    store.update(id, &patch).unwrap();

    let loaded = store.get(id).unwrap();
    assert_eq!(loaded.display_name, "GitHub");
    assert!(!loaded.enabled);
    assert_eq!(loaded.client_id, "github-client");
    assert_eq!(loaded.encrypted_secret, "ct");
    assert_eq!(loaded.encryption_key_id, "k1");
}

#[test]
fn test_sealed_patch_clears_legacy_secret() {
    let store = in_memory_store();
    let mut record = sample_record("github");
    record.legacy_secret = "plaintext".to_string();
    let id = store.create(&record).unwrap();

    store.update(id, &ProviderPatch::sealed(sealed("a"))).unwrap();

    let loaded = store.get(id).unwrap();
    assert_eq!(loaded.legacy_secret, "");
    assert_eq!(loaded.encrypted_secret, "ct-a");
    assert_eq!(loaded.encryption_key_id, "key-a");
}

#[test]
fn test_seal_if_unchanged_applies_to_matching_record() {
    let store = in_memory_store();
    let mut record = sample_record("github");
    record.legacy_secret = "plaintext".to_string();
    let id = store.create(&record).unwrap();
    let snapshot = store.get(id).unwrap();

    assert!(store.seal_if_unchanged(id, &snapshot, &sealed("a")).unwrap());

    let loaded = store.get(id).unwrap();
    assert_eq!(loaded.legacy_secret, "");
    assert_eq!(loaded.encrypted_secret, "ct-a");
    assert_eq!(loaded.encryption_key_id, "key-a");
}

#[test]
fn test_seal_if_unchanged_skips_changed_secret() {
    let store = in_memory_store();
    let id = store.create(&sample_record("github")).unwrap();
    store.update(id, &ProviderPatch::sealed(sealed("a"))).unwrap();
    let snapshot = store.get(id).unwrap();

    // Secret replaced after the snapshot was taken
    store.update(id, &ProviderPatch::sealed(sealed("b"))).unwrap();

    assert!(!store.seal_if_unchanged(id, &snapshot, &sealed("c")).unwrap());
    let loaded = store.get(id).unwrap();
    assert_eq!(loaded.encrypted_secret, "ct-b");
    assert_eq!(loaded.encryption_key_id, "key-b");
}

#[test]
fn test_seal_if_unchanged_unknown_id() {
    let store = in_memory_store();
    let snapshot = sample_record("ghost");
    let result = store.seal_if_unchanged(9, &snapshot, &sealed("a"));
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[test]
fn test_update_nonexistent() {
    let store = in_memory_store();
    let result = store.update(9, &ProviderPatch::sealed(sealed("a")));
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[test]
fn test_rename_to_existing_name_conflicts() {
    let store = in_memory_store();
    store.create(&sample_record("github")).unwrap();
    let id = store.create(&sample_record("gitlab")).unwrap();

    let patch = ProviderPatch {
        name: Some("github".to_string()),
        ..ProviderPatch::default()
    };
    assert!(matches!(store.update(id, &patch), Err(StoreError::Conflict(_))));
}

#[test]
fn test_query_by_secret_state() {
    let store = in_memory_store();

    let mut legacy = sample_record("legacy");
    legacy.legacy_secret = "plain".to_string();
    store.create(&legacy).unwrap();

    let mut encrypted = sample_record("encrypted");
    encrypted.encrypted_secret = "ct".to_string();
    encrypted.encryption_key_id = "k1".to_string();
    store.create(&encrypted).unwrap();

    store.create(&sample_record("empty")).unwrap();

    let pending = store
        .query(&ProviderFilter::with_secret_state(SecretState::LegacyOnly))
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "legacy");

    let sealed = store
        .query(&ProviderFilter::with_secret_state(SecretState::Encrypted))
        .unwrap();
    assert_eq!(sealed.len(), 1);
    assert_eq!(sealed[0].name, "encrypted");

    assert_eq!(store.count(&ProviderFilter::default()).unwrap(), 3);
}

#[test]
fn test_query_name_contains_and_paging() {
    let store = in_memory_store();
    for name in ["github", "github_enterprise", "gitlab", "google", "git%hub"] {
        store.create(&sample_record(name)).unwrap();
    }

    let filter = ProviderFilter {
        name_contains: Some("git".to_string()),
        ..ProviderFilter::default()
    };
    assert_eq!(store.count(&filter).unwrap(), 4);

    let page = store
        .query(&ProviderFilter {
            offset: Some(1),
            limit: Some(2),
            ..filter.clone()
        })
        .unwrap();
    let names: Vec<&str> = page.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["github_enterprise", "gitlab"]);

    // LIKE wildcards in the fragment are matched literally
    let literal = ProviderFilter {
        name_contains: Some("%".to_string()),
        ..ProviderFilter::default()
    };
    assert_eq!(store.count(&literal).unwrap(), 1);

    let underscore = ProviderFilter {
        name_contains: Some("_".to_string()),
        ..ProviderFilter::default()
    };
    assert_eq!(store.count(&underscore).unwrap(), 1);
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("providers.db");

    let id = {
        let store = SqliteProviderStore::new(&path).unwrap();
        let mut record = sample_record("github");
        record.last_used_at = Some(Utc::now());
        store.create(&record).unwrap()
    };

    let store = SqliteProviderStore::new(&path).unwrap();
    let loaded = store.get(id).unwrap();
    assert_eq!(loaded.name, "github");
    assert!(loaded.last_used_at.is_some());
}
