//! End-to-end relay tests over real sockets.

use std::time::Duration;

mod common;

use common::{recv_within, signed_up, start_relay, test_config, wait_for_peers};

#[tokio::test]
async fn frames_reach_the_addressed_peer() {
    let relay = start_relay(test_config()).await;
    let (alice_id, alice_token, _) = signed_up(&relay, "alice@example.com").await;
    let (bob_id, bob_token, _) = signed_up(&relay, "bob@example.com").await;

    let mut alice = relay.client.connect(&alice_token).await.unwrap();
    let mut bob = relay.client.connect(&bob_token).await.unwrap();
    wait_for_peers(&relay, 2).await;

    alice.send_to(&bob_id.to_string(), "hello").await.unwrap();
    alice.send_to(&bob_id.to_string(), "a:b:c").await.unwrap();
    assert_eq!(recv_within(&mut bob, 5).await.as_deref(), Some("hello"));
    assert_eq!(recv_within(&mut bob, 5).await.as_deref(), Some("a:b:c"));

    bob.send_to(&alice_id.to_string(), "hi back").await.unwrap();
    assert_eq!(recv_within(&mut alice, 5).await.as_deref(), Some("hi back"));

    relay.shutdown.trigger();
}

#[tokio::test]
async fn bad_frames_and_unknown_targets_keep_the_session_open() {
    let relay = start_relay(test_config()).await;
    let (_, alice_token, _) = signed_up(&relay, "alice@example.com").await;
    let (bob_id, bob_token, _) = signed_up(&relay, "bob@example.com").await;

    let mut alice = relay.client.connect(&alice_token).await.unwrap();
    let mut bob = relay.client.connect(&bob_token).await.unwrap();
    wait_for_peers(&relay, 2).await;

    alice.send_raw("no delimiter here").await.unwrap();
    alice.send_raw(":empty target").await.unwrap();
    alice.send_to("999999", "nobody home").await.unwrap();
    alice.send_to(&bob_id.to_string(), "still here").await.unwrap();

    assert_eq!(recv_within(&mut bob, 5).await.as_deref(), Some("still here"));
    relay.shutdown.trigger();
}

#[tokio::test]
async fn connection_requires_an_access_credential() {
    let relay = start_relay(test_config()).await;
    let (_, _, renewal) = signed_up(&relay, "alice@example.com").await;

    let err = relay.client.connect("not-a-token").await.err().unwrap();
    assert_eq!(err.status(), Some(401));

    let err = relay.client.connect(&renewal).await.err().unwrap();
    assert_eq!(err.status(), Some(401));

    wait_for_peers(&relay, 0).await;
    relay.shutdown.trigger();
}

#[tokio::test]
async fn reconnect_supersedes_the_old_session() {
    let relay = start_relay(test_config()).await;
    let (_, alice_token, _) = signed_up(&relay, "alice@example.com").await;
    let (bob_id, bob_token, _) = signed_up(&relay, "bob@example.com").await;

    let mut alice = relay.client.connect(&alice_token).await.unwrap();
    let mut old_bob = relay.client.connect(&bob_token).await.unwrap();
    wait_for_peers(&relay, 2).await;

    let mut new_bob = relay.client.connect(&bob_token).await.unwrap();
    assert_eq!(recv_within(&mut old_bob, 5).await, None);
    wait_for_peers(&relay, 2).await;

    alice.send_to(&bob_id.to_string(), "to the new one").await.unwrap();
    assert_eq!(recv_within(&mut new_bob, 5).await.as_deref(), Some("to the new one"));
    relay.shutdown.trigger();
}

#[tokio::test]
async fn active_lists_connected_profiles() {
    let relay = start_relay(test_config()).await;
    let (alice_id, alice_token, _) = signed_up(&relay, "alice@example.com").await;
    let (bob_id, bob_token, _) = signed_up(&relay, "bob@example.com").await;

    assert!(relay.client.active(&alice_token).await.unwrap().is_empty());

    let _alice = relay.client.connect(&alice_token).await.unwrap();
    let bob = relay.client.connect(&bob_token).await.unwrap();
    wait_for_peers(&relay, 2).await;

    let ids: Vec<u64> = relay
        .client
        .active(&alice_token)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec![alice_id, bob_id]);

    bob.close().await.unwrap();
    wait_for_peers(&relay, 1).await;
    let active = relay.client.active(&alice_token).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].email, "alice@example.com");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn refresh_works_until_logout() {
    let relay = start_relay(test_config()).await;
    let (id, _, renewal) = signed_up(&relay, "alice@example.com").await;

    let access = relay.client.refresh(&renewal).await.unwrap();
    assert_eq!(relay.client.me(&access).await.unwrap().id, id);

    relay.client.logout(&renewal).await.unwrap();
    let err = relay.client.refresh(&renewal).await.err().unwrap();
    assert_eq!(err.status(), Some(401));

    // Access credentials already issued stay valid until they expire.
    assert_eq!(relay.client.me(&access).await.unwrap().id, id);
    relay.shutdown.trigger();
}

#[tokio::test]
async fn duplicate_email_and_bad_login_are_rejected() {
    let relay = start_relay(test_config()).await;
    let (id, _, _) = signed_up(&relay, "alice@example.com").await;

    let err = relay
        .client
        .create_user("Other", "ALICE@example.com", "pw")
        .await
        .err()
        .unwrap();
    assert_eq!(err.status(), Some(409));

    let err = relay.client.login(id, "wrong").await.err().unwrap();
    assert_eq!(err.status(), Some(401));
    relay.shutdown.trigger();
}

#[tokio::test]
async fn shutdown_closes_sessions_and_stops_the_server() {
    let relay = start_relay(test_config()).await;
    let (_, alice_token, _) = signed_up(&relay, "alice@example.com").await;
    let mut alice = relay.client.connect(&alice_token).await.unwrap();
    wait_for_peers(&relay, 1).await;

    relay.shutdown.trigger();
    assert_eq!(recv_within(&mut alice, 5).await, None);

    let result = tokio::time::timeout(Duration::from_secs(10), relay.task)
        .await
        .expect("server did not stop");
    assert!(result.unwrap().is_ok());
    assert!(reqwest::get(format!("{}/health", relay.base_url)).await.is_err());
}
