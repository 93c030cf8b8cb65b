//! Integration tests for the server linkage lifecycle

use oxircd_core::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn config_with_link(name: &str, address: &str, port: u16, auto_timeout: Option<u64>) -> Arc<Config> {
    let mut config = Config::default();
    config.links.push(LinkBlock {
        name: name.to_string(),
        address: address.to_string(),
        port,
        tls: false,
        ircd: None,
        auto_timeout,
    });
    Arc::new(config)
}

#[tokio::test]
async fn test_connect_requires_a_block() {
    let pool = Arc::new(Database::new());
    let (links, _events) = ServerConnectionManager::new(Arc::new(Config::default()), pool);

    let err = links.connect_server("ghost.example.org", false).unwrap_err();
    assert!(err.to_string().contains("No connect block"));
}

#[tokio::test]
async fn test_auto_only_requires_autoconnect() {
    let pool = Arc::new(Database::new());
    let config = config_with_link("hub.example.org", "127.0.0.1", 7000, None);
    let (links, _events) = ServerConnectionManager::new(config, pool);

    let err = links.connect_server("hub.example.org", true).unwrap_err();
    assert!(err.to_string().contains("Autoconnect is not enabled"));
}

#[tokio::test]
async fn test_known_server_is_rejected() {
    let pool = Arc::new(Database::new());
    pool.add_server(Server::new(
        "hub.example.org".to_string(),
        "1HB".to_string(),
        "Hub".to_string(),
        1,
    ))
    .unwrap();
    let config = config_with_link("hub.example.org", "127.0.0.1", 7000, Some(30));
    let (links, _events) = ServerConnectionManager::new(config, pool);

    let err = links.connect_server("hub.example.org", true).unwrap_err();
    assert!(err.to_string().contains("already connected"));
}

#[tokio::test]
async fn test_manual_connect_during_autoconnect() {
    let pool = Arc::new(Database::new());
    // blackhole address: the attempt hangs until the 5s timeout, which is
    // longer than this test lives
    let config = config_with_link("hub.example.org", "203.0.113.1", 7000, Some(30));
    let (links, _events) = ServerConnectionManager::new(config, pool);

    links.connect_server("hub.example.org", true).unwrap();
    assert!(links.attempt_pending("hub.example.org"));

    // a manual CONNECT while the timer is armed fails fast
    let err = links.connect_server("HUB.example.org", false).unwrap_err();
    assert!(err.to_string().contains("Already trying to connect"));
    assert!(links.attempt_pending("hub.example.org"));

    assert!(links.cancel_connection("hub.example.org", false));
    assert!(!links.attempt_pending("hub.example.org"));
    assert!(!links.cancel_connection("hub.example.org", false));
}

#[tokio::test]
async fn test_refused_connection_reports_failure() {
    // bind then drop to find a port with nothing listening
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let pool = Arc::new(Database::new());
    let config = config_with_link("hub.example.org", "127.0.0.1", port, None);
    let (links, mut events) = ServerConnectionManager::new(config, pool);

    links.connect_server("hub.example.org", false).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no link event")
        .expect("event channel closed");
    match event {
        LinkEvent::ConnectFail { name, .. } => assert_eq!(name, "hub.example.org"),
        other => panic!("expected ConnectFail, got {:?}", other),
    }
    assert!(!links.attempt_pending("hub.example.org"));
}

#[tokio::test]
async fn test_successful_connection_establishes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        // hold the accepted socket open
        if let Ok((socket, _)) = listener.accept().await {
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        }
    });

    let pool = Arc::new(Database::new());
    let config = config_with_link("hub.example.org", "127.0.0.1", port, None);
    let (links, mut events) = ServerConnectionManager::new(config, pool);

    links.connect_server("hub.example.org", false).unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no link event")
        .expect("event channel closed");
    match event {
        LinkEvent::Established { name, protocol } => {
            assert_eq!(name, "hub.example.org");
            assert_eq!(protocol, LinkProtocol::Jelp);
        }
        other => panic!("expected Established, got {:?}", other),
    }
    assert!(links.conn_pending("hub.example.org"));
    assert!(!links.attempt_pending("hub.example.org"));
}

#[tokio::test]
async fn test_cancelled_attempt_emits_no_failure() {
    let pool = Arc::new(Database::new());
    let config = config_with_link("hub.example.org", "203.0.113.1", 7000, None);
    let (links, mut events) = ServerConnectionManager::new(config, pool);

    links.connect_server("hub.example.org", false).unwrap();
    assert!(links.cancel_connection("hub.example.org", false));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_register_server_stops_retries() {
    let pool = Arc::new(Database::new());
    let config = config_with_link("hub.example.org", "203.0.113.1", 7000, Some(30));
    let (links, _events) = ServerConnectionManager::new(config, Arc::clone(&pool));

    links.connect_server("hub.example.org", true).unwrap();
    assert!(links.attempt_pending("hub.example.org"));

    // the protocol layer finished registration over an adopted socket
    let (tx, mut rx) = mpsc::unbounded_channel();
    links.adopt_connection(
        "hub.example.org",
        ServerConnection::outbound("hub.example.org", tx),
    );
    links
        .register_server(Server::new(
            "hub.example.org".to_string(),
            "1HB".to_string(),
            "Hub".to_string(),
            1,
        ))
        .unwrap();

    assert!(pool.lookup_server("hub.example.org").is_some());
    assert!(!links.attempt_pending("hub.example.org"));

    links
        .send_to_server(
            "hub.example.org",
            Message::new(MessageType::Ping, vec!["irc.example.org".to_string()]),
        )
        .unwrap();
    let message = rx.try_recv().unwrap();
    assert_eq!(message.command, MessageType::Ping);
}
