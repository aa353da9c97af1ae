//! Integration tests for the observer connection and inbound relaying.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakePlatform, Harness, ServerConn};
use slirc_bridge::{BridgeStore, GroupId, MemoryStore, OutgoingMessage};

const ALICE: &str = "alice@example.org";

/// Bridge with `#test` bridged to a group holding alice, observer welcomed
/// and joined, alice's puppet restored and welcomed.
async fn running_bridge() -> (Harness, GroupId, ServerConn, ServerConn) {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    let group = platform.add_group("#test", &[ALICE]);
    store.add_channel("#test", group).await.unwrap();
    let h = Harness::start(store, platform).await;

    let mut observer = h.welcome_observer().await;
    assert_eq!(observer.recv_line().await.unwrap(), "JOIN #test");
    observer
        .send_raw(":DC-Bridge!b@bridge.test JOIN #test")
        .await;
    observer
        .send_raw(":irc.test 353 DC-Bridge = #test :@DC-Bridge carol +dave")
        .await;

    let mut puppet = h.network.accept("alice|dc").await;
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");

    (h, group, observer, puppet)
}

fn from(group: GroupId, sender: Option<&str>, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        group,
        text: text.to_string(),
        sender: sender.map(str::to_string),
    }
}

#[tokio::test(start_paused = true)]
async fn test_channel_message_relayed_and_puppet_echo_dropped() {
    let (h, group, mut observer, _puppet) = running_bridge().await;

    observer.privmsg_from("alice|dc", "#test", "hello").await;
    observer.privmsg_from("carol", "#test", "hi there").await;

    assert_eq!(
        h.platform.next_sent().await,
        from(group, Some("carol"), "hi there")
    );
    assert_eq!(h.platform.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_channel_action_rendered_with_marker() {
    let (h, group, mut observer, _puppet) = running_bridge().await;

    observer
        .privmsg_from("carol", "#TEST", "\x01ACTION waves\x01")
        .await;
    assert_eq!(
        h.platform.next_sent().await,
        from(group, Some("carol"), "/me waves")
    );
}

#[tokio::test(start_paused = true)]
async fn test_unmapped_channel_is_left() {
    let (h, _group, mut observer, _puppet) = running_bridge().await;

    observer.privmsg_from("carol", "#ghost", "anyone?").await;
    assert_eq!(observer.recv_line().await.unwrap(), "PART #ghost");
    assert!(h.platform.sent().is_empty());
    assert!(h.store.channel_group("#ghost").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_topic_query() {
    let (h, group, mut observer, _puppet) = running_bridge().await;

    let server = async {
        assert_eq!(observer.recv_line().await.unwrap(), "TOPIC #test");
        observer
            .send_raw(":irc.test 332 DC-Bridge #test :All about testing")
            .await;
    };
    let (topic, ()) = tokio::join!(h.bridge.topic(group), server);
    assert_eq!(topic.unwrap(), "All about testing");

    // No answer: the cached topic is used once the query times out.
    let silent = async {
        assert_eq!(observer.recv_line().await.unwrap(), "TOPIC #test");
    };
    let (topic, ()) = tokio::join!(h.bridge.topic(group), silent);
    assert_eq!(topic.unwrap(), "All about testing");
}

#[tokio::test(start_paused = true)]
async fn test_missing_topic_reads_as_dash() {
    let (h, group, mut observer, _puppet) = running_bridge().await;

    let server = async {
        assert_eq!(observer.recv_line().await.unwrap(), "TOPIC #test");
        observer
            .send_raw(":irc.test 331 DC-Bridge #test :No topic is set")
            .await;
    };
    let (topic, ()) = tokio::join!(h.bridge.topic(group), server);
    assert_eq!(topic.unwrap(), "-");
}

#[tokio::test(start_paused = true)]
async fn test_names_track_membership() {
    let (h, group, mut observer, _puppet) = running_bridge().await;

    observer.send_raw(":erin!e@users.test JOIN #test").await;
    observer.send_raw(":dave!d@users.test PART #test").await;
    observer.send_raw(":carol!c@users.test NICK caroline").await;
    // Barrier: once this is relayed, everything above was handled.
    observer.privmsg_from("erin", "#test", "sync").await;
    h.platform.next_sent().await;

    let names = h.bridge.names(group).await.unwrap();
    assert_eq!(names, ["DC-Bridge", "caroline", "erin"]);
}

#[tokio::test(start_paused = true)]
async fn test_private_message_opens_private_chat() {
    let (h, _group, _observer, mut puppet) = running_bridge().await;

    puppet.privmsg_from("carol", "alice|dc", "psst").await;
    let sent = h.platform.next_sent().await;
    let chat = h.platform.group_named("carol [irc]").expect("private chat created");
    assert_eq!(sent, from(chat, Some("carol"), "psst"));
    assert!(h.platform.group_members(chat).contains(&ALICE.to_string()));
    assert_eq!(h.store.private_chat(ALICE, "carol").await.unwrap(), Some(chat));

    puppet
        .privmsg_from("carol", "alice|dc", "\x01ACTION winks\x01")
        .await;
    assert_eq!(
        h.platform.next_sent().await,
        from(chat, Some("carol"), "/me winks")
    );
}

#[tokio::test(start_paused = true)]
async fn test_no_such_nick_reported_as_system_message() {
    let (h, _group, _observer, mut puppet) = running_bridge().await;

    puppet
        .send_raw(":irc.test 401 alice|dc ghost :No such nick/channel")
        .await;
    let sent = h.platform.next_sent().await;
    let chat = h.platform.group_named("ghost [irc]").expect("private chat created");
    assert_eq!(sent, from(chat, None, "❌ ghost:No such nick/channel"));
}

#[tokio::test(start_paused = true)]
async fn test_observer_nick_collision_and_reconnect() {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    let h = Harness::start(store, platform).await;

    let mut observer = h.network.accept("DC-Bridge").await;
    observer.nick_in_use().await;
    assert_eq!(observer.recv_line().await.unwrap(), "NICK DC-Bridge2");
    observer.nick = "DC-Bridge2".into();
    observer.welcome().await;

    for _ in 0..50 {
        if h.bridge.observer().nick() == "DC-Bridge2" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.bridge.observer().nick(), "DC-Bridge2");

    drop(observer);
    let observer = h
        .network
        .try_accept("DC-Bridge2", Duration::from_secs(30))
        .await;
    assert!(observer.is_some(), "observer reconnects with its current nick");
}

#[tokio::test(start_paused = true)]
async fn test_failed_restore_retried_on_next_welcome() {
    let store = Arc::new(MemoryStore::new());
    let platform = Arc::new(FakePlatform::new());
    let group = platform.add_group("#test", &[ALICE]);
    store.add_channel("#test", group).await.unwrap();
    platform.set_names_down(true);
    let h = Harness::start(store, platform).await;

    let observer = h.welcome_observer().await;
    assert!(
        h.network
            .try_accept("alice|dc", Duration::from_secs(10))
            .await
            .is_none()
    );

    h.platform.set_names_down(false);
    drop(observer);
    let mut observer = h
        .network
        .try_accept("DC-Bridge", Duration::from_secs(30))
        .await
        .expect("observer reconnects");
    observer.welcome().await;

    let mut puppet = h
        .network
        .try_accept("alice|dc", Duration::from_secs(30))
        .await
        .expect("puppet restored after second welcome");
    puppet.welcome().await;
    assert_eq!(puppet.recv_line().await.unwrap(), "JOIN #test");
}
