//! End-to-end tests against an in-process fake graph server
//!
//! Exercises both transports over plain TCP on loopback.

mod common;

use bytes::Bytes;
use common::{config, spawn_header_server, spawn_http2_server, Behavior, SESSION_ID};
use nebula_wire::connection::{Connection, ConnectionState, ServerAddress, TransportConfig};
use nebula_wire::{ConnectionInfo, Error, ErrorCode, ParameterMap, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_header_transport_round_trip() {
    let server = spawn_header_server(Behavior::Normal).await;
    let mut conn = Connection::connect(server.address.clone(), config())
        .await
        .expect("connect");
    assert!(conn.is_open());

    let auth = conn.authenticate("root", "nebula").await.expect("authenticate");
    assert!(auth.error_code.is_success());
    assert_eq!(auth.session_id, Some(SESSION_ID));

    let resp = conn.execute(SESSION_ID, "YIELD 1").await.expect("execute");
    let data = resp.data.expect("data set");
    assert_eq!(data.column_names, vec![Bytes::from_static(b"1")]);
    assert_eq!(data.rows[0].values, vec![Value::Int(1)]);

    let mut params = ParameterMap::new();
    params.insert("p".into(), Value::from(5i64));
    conn.execute_with_parameter_timeout(SESSION_ID, "YIELD $p", &params, 1000)
        .await
        .expect("execute with timeout");

    assert!(conn.ping().await);
    conn.sign_out(SESSION_ID).await.expect("sign out");
    conn.close().await.expect("close");

    let methods = server.observed.wait_for_methods(6).await;
    assert_eq!(
        methods,
        vec![
            "verifyClientVersion",
            "authenticate",
            "executeWithParameter",
            "executeWithTimeout",
            "executeWithParameter",
            "signout",
        ]
    );
}

#[tokio::test]
async fn test_bad_credentials_are_a_response() {
    let server = spawn_header_server(Behavior::Normal).await;
    let mut conn = Connection::connect(server.address.clone(), config())
        .await
        .unwrap();

    let auth = conn.authenticate("root", "wrong").await.expect("rpc succeeds");
    assert_eq!(auth.error_code, ErrorCode::E_BAD_USERNAME_PASSWORD);
    assert_eq!(auth.session_id, None);
    assert!(conn.is_open());
}

#[tokio::test]
async fn test_handshake_key_is_sent() {
    let server = spawn_header_server(Behavior::Normal).await;
    let config = TransportConfig::builder()
        .timeout(Duration::from_secs(5))
        .handshake_key("3.0.0")
        .build();
    Connection::connect(server.address.clone(), config)
        .await
        .unwrap();

    let keys = server.observed.handshake_keys.lock().unwrap().clone();
    assert_eq!(keys, vec![Bytes::from_static(b"3.0.0")]);
}

#[tokio::test]
async fn test_handshake_rejected() {
    let server = spawn_header_server(Behavior::RejectHandshake).await;
    let mut conn = Connection::new(server.address.clone(), config());

    let err = conn.open().await.unwrap_err();
    assert!(matches!(err, Error::HandshakeRejected { .. }));
    assert!(err.to_string().contains("client version not in whitelist"));
    assert_eq!(conn.state(), ConnectionState::Rejected);

    let err = conn.execute(SESSION_ID, "YIELD 1").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = ServerAddress::new("127.0.0.1", listener.local_addr().unwrap().port());
    drop(listener);

    let err = Connection::connect(address, config()).await.unwrap_err();
    assert!(matches!(err, Error::TransportOpen(_)));
}

#[tokio::test]
async fn test_execute_json_reopens_after_timeout() {
    let server = spawn_header_server(Behavior::SlowFirstQuery(Duration::from_millis(600))).await;
    let config = TransportConfig::builder()
        .timeout(Duration::from_millis(200))
        .build();
    let mut conn = Connection::connect(server.address.clone(), config.clone())
        .await
        .unwrap();

    let doc: serde_json::Value = conn
        .execute_json_as(SESSION_ID, "MATCH (v) RETURN v", &ParameterMap::new())
        .await
        .expect("retried request succeeds");
    assert_eq!(doc["stmt"], "MATCH (v) RETURN v");
    assert_eq!(doc["results"][0]["errors"]["code"], 0);

    assert!(conn.is_open());
    assert_eq!(conn.config(), &config);
    assert_eq!(server.observed.accepted.load(Ordering::SeqCst), 2);
    assert_eq!(server.observed.handshake_keys.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_skipped() {
    let server = spawn_header_server(Behavior::SlowFirstQuery(Duration::from_millis(300))).await;
    let config = TransportConfig::builder()
        .timeout(Duration::from_millis(150))
        .build();
    let mut conn = Connection::connect(server.address.clone(), config)
        .await
        .unwrap();

    let err = conn.execute(SESSION_ID, "YIELD 1").await.unwrap_err();
    assert!(err.is_timeout());
    tokio::time::sleep(Duration::from_millis(400)).await;

    // the late reply to the timed-out request is waiting in the socket
    for stmt in ["YIELD 2", "YIELD 3", "YIELD 4"] {
        let resp = conn.execute(SESSION_ID, stmt).await.expect(stmt);
        assert!(resp.error_code.is_success());
    }
    assert!(conn.ping().await);
    assert!(conn.is_open());
    let doc: serde_json::Value = conn
        .execute_json_as(SESSION_ID, "YIELD 5", &ParameterMap::new())
        .await
        .unwrap();
    assert_eq!(doc["stmt"], "YIELD 5");

    // no reopen on this path
    assert_eq!(server.observed.accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_server_hang_up_closes_connection() {
    let server = spawn_header_server(Behavior::HangUpOnQuery).await;
    let mut conn = Connection::connect(server.address.clone(), config())
        .await
        .unwrap();

    let err = conn.execute(SESSION_ID, "YIELD 1").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed | Error::Io(_)), "{:?}", err);
    assert!(!conn.is_open());

    let err = conn.execute(SESSION_ID, "YIELD 2").await.unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed), "{:?}", err);
    assert!(!conn.ping().await);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_http2_round_trip_with_headers() {
    let server = spawn_http2_server().await;
    let info = ConnectionInfo::parse(&format!(
        "nebula://{}?http2=true&timeout_ms=5000&header.x-trace=a&header.x-trace=b&header.content-type=text/plain",
        server.address
    ))
    .unwrap();
    let (address, config) = info.to_parts().unwrap();

    let mut conn = Connection::connect(address, config).await.expect("connect");
    let auth = conn.authenticate("root", "nebula").await.unwrap();
    assert_eq!(auth.session_id, Some(SESSION_ID));

    let payload = conn.execute_json(SESSION_ID, "YIELD 1").await.unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(doc["stmt"], "YIELD 1");
    conn.close().await.unwrap();

    let headers = server.observed.http_headers.lock().unwrap().clone();
    let traces: Vec<_> = headers
        .iter()
        .filter(|(name, _)| name == "x-trace")
        .map(|(_, value)| value.as_str())
        .collect();
    // two values per request, three requests
    assert_eq!(traces.len(), 6);
    assert_eq!(&traces[..2], &["a", "b"]);
    assert!(headers
        .iter()
        .filter(|(name, _)| name == "content-type")
        .all(|(_, value)| value == "application/x-thrift"));
    assert_eq!(server.observed.accepted.load(Ordering::SeqCst), 1);
}
