//! In-process fake graph server shared by the loopback test suites
//!
//! The server speaks the graph service over THeader frames, or over HTTP/2
//! POST, on a loopback TCP socket (optionally TLS) and answers from canned data.

#![allow(dead_code)]

use bytes::{Buf, Bytes, BytesMut};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use nebula_wire::connection::{ServerAddress, TransportConfig};
use nebula_wire::protocol::constants::ttype;
use nebula_wire::protocol::{
    decode_frame, encode_exception, encode_frame, encode_reply, ApplicationErrorKind,
    AuthResponse, DataSet, ErrorCode, ExecutionResponse, Reader, Row, ServerReply, Value,
    VerifyClientVersionResp,
};
use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub const SESSION_ID: i64 = 42;

#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Normal,
    RejectHandshake,
    /// Delay the first query reply on the first accepted connection
    SlowFirstQuery(Duration),
    /// Drop the socket when the first query arrives
    HangUpOnQuery,
}

#[derive(Debug, Default)]
pub struct Observed {
    pub accepted: AtomicUsize,
    pub handshake_keys: Mutex<Vec<Bytes>>,
    pub methods: Mutex<Vec<String>>,
    pub http_headers: Mutex<Vec<(String, String)>>,
}

impl Observed {
    /// Wait until `count` calls were seen; oneway calls have no reply to wait on
    pub async fn wait_for_methods(&self, count: usize) -> Vec<String> {
        for _ in 0..50 {
            if self.methods.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.methods.lock().unwrap().clone()
    }
}

pub struct FakeGraphd {
    pub address: ServerAddress,
    pub observed: Arc<Observed>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config() -> TransportConfig {
    TransportConfig::builder()
        .timeout(Duration::from_secs(5))
        .build()
}

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// TLS acceptor presenting `localhost` / `127.0.0.1`, signed by `fixtures/ca.pem`
pub fn tls_acceptor(alpn_h2: bool) -> TlsAcceptor {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(fixture("server.pem")).expect("server certificate"),
    ))
    .collect::<Result<Vec<_>, _>>()
    .expect("parse server certificate");
    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(fixture("server.key")).expect("server key"),
    ))
    .expect("parse server key")
    .expect("server key present");

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("server TLS config");
    if alpn_h2 {
        config.alpn_protocols = vec![b"h2".to_vec()];
    }
    TlsAcceptor::from(Arc::new(config))
}

/// Request fields the fake server cares about
#[derive(Debug, Default)]
struct Call {
    method: String,
    seq_id: i32,
    strings: Vec<Bytes>,
}

fn parse_call(payload: Bytes) -> Call {
    let mut reader = Reader::new(payload);
    let (method, _, seq_id) = reader.read_message_begin().expect("message header");
    let mut call = Call {
        method,
        seq_id,
        ..Default::default()
    };
    loop {
        let (field_type, _) = reader.read_field_begin().expect("field header");
        match field_type {
            ttype::STOP => break,
            ttype::STRING => call.strings.push(reader.read_binary().expect("binary arg")),
            ttype::STRUCT if call.method == "verifyClientVersion" => loop {
                match reader.read_field_begin().expect("req field") {
                    (ttype::STOP, _) => break,
                    (ttype::STRING, 1) => call.strings.push(reader.read_binary().expect("version")),
                    (t, _) => reader.skip(t).expect("skip"),
                }
            },
            other => reader.skip(other).expect("skip arg"),
        }
    }
    call
}

/// Reply bytes for one call, `None` for oneway calls
fn answer(call: &Call, behavior: Behavior, observed: &Observed) -> Option<Bytes> {
    observed.methods.lock().unwrap().push(call.method.clone());
    let name = call.method.as_str();
    let seq_id = call.seq_id;

    let reply = match name {
        "verifyClientVersion" => {
            let key = call.strings.first().cloned().unwrap_or_default();
            observed.handshake_keys.lock().unwrap().push(key);
            let resp = match behavior {
                Behavior::RejectHandshake => VerifyClientVersionResp {
                    error_code: ErrorCode(-1),
                    error_msg: Some(Bytes::from_static(b"client version not in whitelist")),
                },
                _ => VerifyClientVersionResp::default(),
            };
            encode_reply(name, seq_id, &ServerReply::VerifyClientVersion(&resp))
        }
        "authenticate" => {
            let ok = call.strings.first().map(|u| &u[..]) == Some(&b"root"[..])
                && call.strings.get(1).map(|p| &p[..]) == Some(&b"nebula"[..]);
            let resp = if ok {
                AuthResponse {
                    session_id: Some(SESSION_ID),
                    time_zone_name: Some(Bytes::from_static(b"UTC")),
                    ..Default::default()
                }
            } else {
                AuthResponse {
                    error_code: ErrorCode::E_BAD_USERNAME_PASSWORD,
                    error_msg: Some(Bytes::from_static(b"Invalid password")),
                    ..Default::default()
                }
            };
            encode_reply(name, seq_id, &ServerReply::Authenticate(&resp))
        }
        "executeWithParameter" | "executeWithTimeout" => {
            let resp = ExecutionResponse {
                latency_in_us: 120,
                data: Some(DataSet {
                    column_names: vec![Bytes::from_static(b"1")],
                    rows: vec![Row {
                        values: vec![Value::Int(1)],
                    }],
                }),
                ..Default::default()
            };
            encode_reply(name, seq_id, &ServerReply::Execution(&resp))
        }
        "executeJsonWithParameter" => {
            let stmt = call
                .strings
                .first()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default();
            let doc = serde_json::json!({
                "results": [{ "errors": { "code": 0 }, "latencyInUs": 120 }],
                "stmt": stmt,
            });
            let doc = serde_json::to_vec(&doc).unwrap();
            encode_reply(name, seq_id, &ServerReply::Json(&doc))
        }
        "signout" => return None,
        other => encode_exception(
            other,
            seq_id,
            ApplicationErrorKind::UnknownMethod,
            "unknown method",
        ),
    };
    Some(reply.expect("encode reply").freeze())
}

fn is_query(method: &str) -> bool {
    method.starts_with("execute")
}

async fn serve_header<S>(mut socket: S, behavior: Behavior, index: usize, observed: Arc<Observed>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    let mut queries = 0;
    loop {
        let frame = loop {
            if let Some((frame, consumed)) = decode_frame(&buf).expect("valid frame") {
                buf.advance(consumed);
                break frame;
            }
            match socket.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        };

        let call = parse_call(frame.payload);
        if is_query(&call.method) {
            queries += 1;
            match behavior {
                Behavior::SlowFirstQuery(delay) if index == 0 && queries == 1 => {
                    tokio::time::sleep(delay).await;
                }
                Behavior::HangUpOnQuery => {
                    observed.methods.lock().unwrap().push(call.method);
                    return;
                }
                _ => {}
            }
        }

        if let Some(reply) = answer(&call, behavior, &observed) {
            let frame = encode_frame(frame.seq_id, &[], &reply).expect("encode frame");
            if socket.write_all(&frame).await.is_err() {
                return;
            }
        }
    }
}

async fn serve_http2<S>(io: S, observed: Arc<Observed>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let observed = observed.clone();
        async move {
            {
                let mut headers = observed.http_headers.lock().unwrap();
                for (name, value) in req.headers() {
                    headers.push((
                        name.to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    ));
                }
            }
            let body = req.into_body().collect().await.unwrap().to_bytes();
            let call = parse_call(body);
            let reply = answer(&call, Behavior::Normal, &observed).unwrap_or_default();
            Ok::<_, Infallible>(Response::new(Full::new(reply)))
        }
    });
    let _ = hyper::server::conn::http2::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await;
}

pub async fn spawn_header_server(behavior: Behavior) -> FakeGraphd {
    spawn_server(behavior, false, None).await
}

pub async fn spawn_http2_server() -> FakeGraphd {
    spawn_server(Behavior::Normal, true, None).await
}

/// Spawn a fake server; with an acceptor every connection is TLS
pub async fn spawn_server(
    behavior: Behavior,
    http2: bool,
    acceptor: Option<TlsAcceptor>,
) -> FakeGraphd {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let observed = Arc::new(Observed::default());

    let shared = observed.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let index = shared.accepted.fetch_add(1, Ordering::SeqCst);
            let observed = shared.clone();
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                match (acceptor, http2) {
                    (None, false) => serve_header(socket, behavior, index, observed).await,
                    (None, true) => serve_http2(socket, observed).await,
                    (Some(acceptor), http2) => {
                        let stream = match acceptor.accept(socket).await {
                            Ok(stream) => stream,
                            Err(_) => return,
                        };
                        if http2 {
                            serve_http2(stream, observed).await
                        } else {
                            serve_header(stream, behavior, index, observed).await
                        }
                    }
                }
            });
        }
    });

    FakeGraphd {
        address: ServerAddress::new("127.0.0.1", port),
        observed,
    }
}
