/// Conversation sync integration tests
/// Subscription lifecycle, snapshot application, and conversation switching

// In integration tests, the package is available as an external crate
extern crate chatlink_core;

use chatlink_core::conversation::conversation_key;
use chatlink_core::remote_store::RemoteStore;
use chatlink_core::session::{AuthSession, CurrentUser};
use chatlink_core::sync::SyncState;
use chatlink_core::types::Message;
use chatlink_core::{ChatClient, ChatError};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn user(id: &str) -> CurrentUser {
    CurrentUser {
        id: id.to_string(),
        display_name: format!("User {}", id),
    }
}

fn client_on(remote: &RemoteStore, uid: &str) -> ChatClient {
    ChatClient::new(remote.clone(), AuthSession::with_user(user(uid)))
}

/// Poll the rendered log until `cond` holds or the wait times out
async fn wait_for_log<F>(client: &ChatClient, key: &str, cond: F) -> Vec<Message>
where
    F: Fn(&[Message]) -> bool,
{
    for _ in 0..100 {
        let log = client.log(key).await;
        if cond(&log) {
            return log;
        }
        sleep(Duration::from_millis(20)).await;
    }
    client.log(key).await
}

#[tokio::test]
async fn test_send_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    let key = client.open_conversation_with("U2").await.unwrap();
    assert_eq!(key, "U1_U2");
    assert_eq!(client.sync_state().await, SyncState::Streaming);

    client.send(&key, "hi", "U2").await.unwrap();

    // The snapshot is the only path by which the sender sees the message
    let log = wait_for_log(&client, &key, |l| !l.is_empty()).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].text, "hi");
    assert_eq!(log[0].sender_id, "U1");
    assert!(!log[0].edited);
}

#[tokio::test]
async fn test_no_local_insert_without_subscription() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    // Send without an open conversation: the write lands remotely but the
    // rendered log never changes (no optimistic insert)
    let key = conversation_key("U1", "U2");
    client.send(&key, "hi", "U2").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(client.log(&key).await.is_empty());
    assert_eq!(remote.snapshot(&key).unwrap().len(), 1);
}

#[tokio::test]
async fn test_edit_keeps_created_at() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    let key = client.open_conversation_with("U2").await.unwrap();
    client.send(&key, "hi", "U2").await.unwrap();
    let log = wait_for_log(&client, &key, |l| !l.is_empty()).await;
    let original = log[0].clone();

    client.edit(&key, &original.id, "hello").await.unwrap();
    let log = wait_for_log(&client, &key, |l| l.first().map(|m| m.edited) == Some(true)).await;

    assert_eq!(log.len(), 1);
    assert_eq!(log[0].text, "hello");
    assert!(log[0].edited);
    assert_eq!(log[0].created_at, original.created_at);
}

#[tokio::test]
async fn test_delete_then_redelete_is_success() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    let key = client.open_conversation_with("U2").await.unwrap();
    client.send(&key, "first", "U2").await.unwrap();
    client.send(&key, "second", "U2").await.unwrap();
    let log = wait_for_log(&client, &key, |l| l.len() == 2).await;
    let doomed = log[0].id.clone();

    client.delete(&key, &doomed).await.unwrap();
    let log = wait_for_log(&client, &key, |l| l.len() == 1).await;
    assert!(log.iter().all(|m| m.id != doomed));

    // Second delete of the same id: success, not an error
    client.delete(&key, &doomed).await.unwrap();
    assert_eq!(client.log(&key).await.len(), 1);
}

#[tokio::test]
async fn test_subscription_switch_leaves_one_live() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    let k1 = client.open_conversation_with("U2").await.unwrap();
    let k2 = client.open_conversation_with("U3").await.unwrap();
    assert_eq!(client.active_conversation().await, Some(k2.clone()));

    // The K1 subscription tears down when K2 opens
    for _ in 0..100 {
        if remote.watcher_count(&k1).await == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remote.watcher_count(&k1).await, 0);
    assert_eq!(remote.watcher_count(&k2).await, 1);

    // A late write into K1 must not disturb K2's log
    let peer = client_on(&remote, "U2");
    peer.send(&k1, "late arrival", "U1").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert!(client.log(&k2).await.is_empty());
    // K1's rendered log is stale by design: its subscription is closed
    assert!(client.log(&k1).await.is_empty());
}

#[tokio::test]
async fn test_two_clients_converge() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let alice = client_on(&remote, "U1");
    let bob = client_on(&remote, "U2");

    let key = alice.open_conversation_with("U2").await.unwrap();
    bob.open_conversation_with("U1").await.unwrap();

    alice.send(&key, "hello bob", "U2").await.unwrap();
    bob.send(&key, "hello alice", "U1").await.unwrap();

    let alice_log = wait_for_log(&alice, &key, |l| l.len() == 2).await;
    let bob_log = wait_for_log(&bob, &key, |l| l.len() == 2).await;

    assert_eq!(alice_log, bob_log);
    assert_eq!(alice_log[0].text, "hello bob");
    assert_eq!(alice_log[1].text, "hello alice");
}

#[tokio::test]
async fn test_open_requires_authentication() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = ChatClient::new(remote, AuthSession::new());

    let result = client.open_conversation("U1_U2").await;
    assert!(matches!(result, Err(ChatError::Unauthenticated)));
    assert_eq!(client.sync_state().await, SyncState::Closed);
}

#[tokio::test]
async fn test_close_conversation_lands_closed() {
    let temp_dir = TempDir::new().unwrap();
    let remote = RemoteStore::open(temp_dir.path()).unwrap();
    let client = client_on(&remote, "U1");

    let key = client.open_conversation_with("U2").await.unwrap();
    assert_eq!(client.sync_state().await, SyncState::Streaming);

    client.close_conversation().await;
    assert_eq!(client.sync_state().await, SyncState::Closed);
    assert_eq!(client.active_conversation().await, None);

    for _ in 0..100 {
        if remote.watcher_count(&key).await == 0 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remote.watcher_count(&key).await, 0);
}
