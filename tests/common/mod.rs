//! Shared harness for integration tests.

use std::time::Duration;

use peer_relay::config::RelayConfig;
use peer_relay::{RelayServer, Shutdown};
use relay_sdk::{PeerConnection, RelayClient};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestRelay {
    pub base_url: String,
    pub client: RelayClient,
    pub shutdown: Shutdown,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.auth.jwt_secret = TEST_SECRET.into();
    config.shutdown.grace_period_secs = 2;
    config.relay.delivery_timeout_secs = 2;
    config
}

/// Start a relay on an ephemeral port.
pub async fn start_relay(config: RelayConfig) -> TestRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RelayServer::new(config);
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run(listener));

    let base_url = format!("http://{addr}");
    TestRelay {
        client: RelayClient::new(&base_url),
        base_url,
        shutdown,
        task,
    }
}

/// Register a user, log in, and return (user id, access, renewal).
pub async fn signed_up(relay: &TestRelay, email: &str) -> (u64, String, String) {
    let id = relay.client.create_user("Test", email, PASSWORD).await.unwrap();
    let pair = relay.client.login(id, PASSWORD).await.unwrap();
    (id, pair.access_token, pair.refresh_token)
}

/// Wait until the relay lists `count` connected peers.
pub async fn wait_for_peers(relay: &TestRelay, count: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let health = relay.client.health().await.unwrap();
        if health["connected_peers"].as_u64() == Some(count) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "relay never reached {count} peers: {health}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Receive with a bound so a missing delivery fails instead of hanging.
pub async fn recv_within(conn: &mut PeerConnection, secs: u64) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(secs), conn.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
}
