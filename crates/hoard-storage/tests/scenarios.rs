//! End-to-end behaviour of the tiered store and message index on a real
//! database file, including reopening it as a fresh process would.

use serde_json::{json, Value};

use hoard_core::config::StorageConfig;
use hoard_core::types::MessageRecord;
use hoard_storage::TierManager;

fn config_in(dir: &tempfile::TempDir) -> StorageConfig {
    StorageConfig {
        db_path: dir.path().join("hoard.db").to_string_lossy().to_string(),
        ..StorageConfig::default()
    }
}

#[tokio::test]
async fn local_only_values_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    {
        let manager = TierManager::bootstrap(&config).await.unwrap();
        assert!(manager.health().local_only);
        manager
            .set("users", "42", &json!({"banned": true}))
            .await
            .unwrap();
        manager.set("settings", "nick", &Value::Null).await.unwrap();
    }

    let manager = TierManager::bootstrap(&config).await.unwrap();
    assert_eq!(
        manager.get("users", "42", Value::Null).await.unwrap(),
        json!({"banned": true})
    );
    assert_eq!(
        manager.get("settings", "nick", json!("unset")).await.unwrap(),
        Value::Null
    );
    assert_eq!(
        manager.get("settings", "absent", json!("unset")).await.unwrap(),
        json!("unset")
    );
}

#[tokio::test]
async fn flag_toggle_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TierManager::bootstrap(&config_in(&dir)).await.unwrap();

    manager.set("flags", "ghost", &json!(true)).await.unwrap();
    assert_eq!(
        manager.get("flags", "ghost", json!(false)).await.unwrap(),
        json!(true)
    );
    manager.set("flags", "ghost", &json!(false)).await.unwrap();
    assert_eq!(
        manager.get("flags", "ghost", json!(false)).await.unwrap(),
        json!(false)
    );

    manager.delete("flags", "ghost").await.unwrap();
    manager.delete("flags", "ghost").await.unwrap();
    assert_eq!(
        manager.get("flags", "ghost", json!("default")).await.unwrap(),
        json!("default")
    );
}

#[tokio::test]
async fn edited_message_replaces_index_entry_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let t = 1_700_000_000.0;

    {
        let manager = TierManager::bootstrap(&config).await.unwrap();
        let index = manager.message_index();
        index
            .ingest(&MessageRecord {
                message_id: 1,
                chat_id: 100,
                text: "the secret key is 42".to_string(),
                timestamp: t,
                sender_id: 7,
            })
            .unwrap();
        index
            .ingest(&MessageRecord {
                message_id: 1,
                chat_id: 100,
                text: "the secret key is 99".to_string(),
                timestamp: t + 5.0,
                sender_id: 7,
            })
            .unwrap();
    }

    let manager = TierManager::bootstrap(&config).await.unwrap();
    let index = manager.message_index();
    assert!(index.search("42", 10).unwrap().is_empty());
    let hits = index.search("99", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.text, "the secret key is 99");
    assert_eq!(hits[0].record.timestamp, t + 5.0);
}

#[tokio::test]
async fn key_value_and_index_share_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TierManager::bootstrap(&config_in(&dir)).await.unwrap();

    manager.set("memory", "enabled", &json!(true)).await.unwrap();
    manager
        .message_index()
        .ingest(&MessageRecord {
            message_id: 5,
            chat_id: -1001,
            text: "deploy on friday".to_string(),
            timestamp: 1.0,
            sender_id: 0,
        })
        .unwrap();

    // Wiping the index leaves key-value data alone.
    manager.message_index().wipe().unwrap();
    assert!(manager.message_index().is_empty().unwrap());
    assert_eq!(
        manager.get("memory", "enabled", json!(false)).await.unwrap(),
        json!(true)
    );
}
