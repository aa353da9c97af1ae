//! Integration tests for puppet connections: lazy connect, queued delivery,
//! nick collisions, reconnects and closing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bridge_proto::Command;
use common::{FakePlatform, Harness};
use futures_util::future::join_all;
use slirc_bridge::{BridgeStore, GroupMessage, MemoryStore, PuppetState};

const ALICE: &str = "alice@example.org";

async fn bridged_test_channel() -> (Harness, slirc_bridge::GroupId) {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    let group = platform.add_group("#test", &[ALICE]);
    store.add_channel("#test", group).await.unwrap();
    let harness = Harness::start(store, platform).await;
    (harness, group)
}

fn is_privmsg(msg: &bridge_proto::Message) -> bool {
    matches!(msg.command, Command::PRIVMSG(..))
}

#[tokio::test(start_paused = true)]
async fn test_first_message_connects_joins_and_sends() {
    let (h, group) = bridged_test_channel().await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "hello"))
        .await
        .unwrap();

    let mut puppet = h.network.accept("alice|dc").await;
    let snapshot = h.bridge.puppets().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].pending, 1);
    assert_ne!(snapshot[0].state, PuppetState::Welcomed);

    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "PRIVMSG #test :hello");

    assert_eq!(h.store.nick(ALICE).await.unwrap().as_deref(), Some("alice"));
}

#[tokio::test(start_paused = true)]
async fn test_commands_before_welcome_keep_submission_order() {
    let (h, group) = bridged_test_channel().await;

    for text in ["one", "two", "three"] {
        h.bridge
            .on_group_message(GroupMessage::text(group, ALICE, text))
            .await
            .unwrap();
    }
    h.bridge.on_action(group, ALICE, "waves").await.unwrap();

    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;

    let lines = [
        "JOIN #test",
        "PRIVMSG #test :one",
        "PRIVMSG #test :two",
        "PRIVMSG #test :three",
        "PRIVMSG #test :\x01ACTION waves\x01",
    ];
    for expected in lines {
        assert_eq!(puppet.recv_line().await.unwrap(), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_delivery_opens_one_connection() {
    let (h, group) = bridged_test_channel().await;

    let sends = (0..10).map(|i| {
        h.bridge
            .on_group_message(GroupMessage::text(group, ALICE, format!("msg {i}")))
    });
    for result in join_all(sends).await {
        result.unwrap();
    }

    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;
    let mut received = 0;
    while received < 10 {
        if is_privmsg(&puppet.recv().await.unwrap()) {
            received += 1;
        }
    }

    assert!(
        h.network
            .try_accept("alice|dc", Duration::from_secs(30))
            .await
            .is_none()
    );
    assert_eq!(h.bridge.puppets().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_nick_in_use_renames_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    platform.set_name(ALICE, "bob");
    let group = platform.add_group("#test", &[ALICE]);
    store.add_channel("#test", group).await.unwrap();
    let h = Harness::start(store, platform).await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "hi"))
        .await
        .unwrap();

    let mut puppet = h.network.accept("bob|dc").await;
    puppet.nick_in_use().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "NICK bob_|dc");

    let mut stored = None;
    for _ in 0..50 {
        stored = h.store.nick(ALICE).await.unwrap();
        if stored.as_deref() == Some("bob_") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored.as_deref(), Some("bob_"));

    puppet.nick = "bob_|dc".into();
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "PRIVMSG #test :hi");
    assert!(h.bridge.registry().is_puppet_nick("BOB_|DC"));
    assert!(!h.bridge.registry().is_puppet_nick("bob|dc"));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reconnects_after_fixed_delay() {
    let (h, group) = bridged_test_channel().await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "before"))
        .await
        .unwrap();
    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;
    puppet.recv_until(is_privmsg).await.unwrap();
    drop(puppet);

    assert!(
        h.network
            .try_accept("alice|dc", Duration::from_secs(10))
            .await
            .is_none()
    );

    let mut puppet = h
        .network
        .try_accept("alice|dc", Duration::from_secs(30))
        .await
        .expect("puppet reconnects");
    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "after"))
        .await
        .unwrap();
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "PRIVMSG #test :after");
}

#[tokio::test(start_paused = true)]
async fn test_refused_connects_retry_until_success() {
    let (h, group) = bridged_test_channel().await;
    h.connector.set_refuse(true);

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "queued"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(50)).await;
    // the puppet alone: first attempt plus three retries
    assert!(h.connector.connections() >= 4);

    h.connector.set_refuse(false);
    let mut puppet = h
        .network
        .try_accept("alice|dc", Duration::from_secs(30))
        .await
        .expect("puppet reconnects");
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "PRIVMSG #test :queued");
}

#[tokio::test(start_paused = true)]
async fn test_leaving_last_channel_closes_for_good() {
    let (h, group) = bridged_test_channel().await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "bye"))
        .await
        .unwrap();
    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;
    puppet.recv_until(is_privmsg).await.unwrap();

    h.bridge.registry().leave_channel(ALICE, "#test").unwrap();
    assert_eq!(puppet.recv_line().await.unwrap(), "PART #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "QUIT");
    assert!(puppet.closed().await);

    assert!(
        h.network
            .try_accept("alice|dc", Duration::from_secs(60))
            .await
            .is_none()
    );
    assert!(h.bridge.puppets().await.unwrap().is_empty());
    assert!(!h.bridge.registry().is_puppet_nick("alice|dc"));
}

#[tokio::test(start_paused = true)]
async fn test_queued_message_survives_drop_during_join_pause() {
    let (h, group) = bridged_test_channel().await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "hello"))
        .await
        .unwrap();
    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;
    // Still inside the pause before the first JOIN.
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(puppet);

    let mut puppet = h
        .network
        .try_accept("alice|dc", Duration::from_secs(30))
        .await
        .expect("puppet reconnects");
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
    assert_eq!(puppet.recv_line().await.unwrap(), "PRIVMSG #test :hello");
}

#[tokio::test(start_paused = true)]
async fn test_repeated_nick_collisions_persist_latest_nick() {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    platform.set_name(ALICE, "bob");
    let group = platform.add_group("#test", &[ALICE]);
    store.add_channel("#test", group).await.unwrap();
    let h = Harness::start(store, platform).await;

    h.bridge
        .on_group_message(GroupMessage::text(group, ALICE, "hi"))
        .await
        .unwrap();

    let mut puppet = h.network.accept("bob|dc").await;
    puppet.nick_in_use().await;
    puppet.nick_in_use().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "NICK bob_|dc");
    assert_eq!(puppet.recv_line().await.unwrap(), "NICK bob__|dc");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.store.nick(ALICE).await.unwrap().as_deref(), Some("bob__"));
}
