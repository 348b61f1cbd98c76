// tests/pipeline_test.rs
//! End-to-end capture tests against an in-process collector

use bytes::Bytes;
use egress_capture::interception::blocking::{client_fn, BlockingClient};
use egress_capture::{Instrumentation, Settings};
use hyper::{Request, Response, StatusCode};
use serde_json::Value;
use std::convert::Infallible;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

/// Minimal HTTP/1.1 collector answering every request with `status`
struct TestCollector {
    url: String,
    received: Receiver<(String, Value)>,
}

impl TestCollector {
    fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, received) = mpsc::channel();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let tx = tx.clone();
                thread::spawn(move || serve(stream, status, tx));
            }
        });

        Self { url, received }
    }

    fn next(&self) -> (String, Value) {
        self.received.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    fn settings(&self) -> Settings {
        Settings {
            server_url: self.url.clone(),
            ..Settings::default()
        }
    }
}

fn serve(stream: TcpStream, status: u16, tx: Sender<(String, Value)>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).unwrap_or(0) == 0 {
            return;
        }

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }

        let mut body = vec![0; content_length];
        if reader.read_exact(&mut body).is_err() {
            return;
        }
        let _ = tx.send((request_line.trim_end().to_string(), serde_json::from_slice(&body).unwrap()));

        if write!(writer, "HTTP/1.1 {} Test\r\ncontent-length: 0\r\n\r\n", status).is_err() {
            return;
        }
    }
}

fn upstream(request: Request<Bytes>) -> Result<Response<Bytes>, Infallible> {
    assert_eq!(request.body().as_ref(), b"{\"q\":\"ping\"}");
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(Bytes::from_static(b"{\"a\":\"pong\"}"))
        .unwrap())
}

fn api_request() -> Request<Bytes> {
    Request::post("http://api.example.com/v1/echo?x=1")
        .header("authorization", "Bearer sk-secret")
        .header("content-type", "application/json")
        .body(Bytes::from_static(b"{\"q\":\"ping\"}"))
        .unwrap()
}

#[test]
fn test_blocking_call_is_delivered_to_collector() {
    let collector = TestCollector::start(200);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();

    let client = capture.blocking(client_fn(upstream)).with_library("ureq");
    let response = client.execute(api_request()).unwrap();
    assert_eq!(response.body().as_ref(), b"{\"a\":\"pong\"}");

    assert!(capture.flush(Duration::from_secs(5)));
    let (request_line, record) = collector.next();
    assert_eq!(request_line, "POST /api/capture HTTP/1.1");

    assert!(record["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(record["timestamp"].as_str().is_some());
    assert!(record["duration_ms"].is_u64());
    assert_eq!(record["request"]["method"], "POST");
    assert_eq!(record["request"]["url"], "http://api.example.com/v1/echo?x=1");
    assert_eq!(record["request"]["headers"]["authorization"], "[REDACTED]");
    assert_eq!(record["request"]["headers"]["content-type"], "application/json");
    assert_eq!(record["request"]["body"], "{\"q\":\"ping\"}");
    assert_eq!(record["request"]["body_size"], 12);
    assert_eq!(record["response"]["status_code"], 200);
    assert_eq!(record["response"]["body"], "{\"a\":\"pong\"}");
    assert_eq!(record["meta"]["library"], "ureq");
    assert!(record["meta"].get("error").is_none());

    assert_eq!(capture.stats().delivered, 1);
    assert!(capture.shutdown(Duration::from_secs(2)));
}

#[test]
fn test_rejected_capture_is_dropped() {
    let collector = TestCollector::start(500);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();

    let client = capture.blocking(client_fn(upstream));
    client.execute(api_request()).unwrap();

    assert!(capture.flush(Duration::from_secs(5)));
    collector.next();
    let stats = capture.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.failed, 1);
}

#[test]
fn test_unreachable_collector_never_affects_calls() {
    // Bind then drop to get a port nothing listens on.
    let url = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };
    let settings = Settings {
        server_url: url,
        ..Settings::default()
    };
    let capture = Instrumentation::init(&settings).unwrap().unwrap();

    let client = capture.blocking(client_fn(upstream));
    for _ in 0..3 {
        let response = client.execute(api_request()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert!(capture.flush(Duration::from_secs(10)));
    assert_eq!(capture.stats().failed, 3);
}

#[test]
fn test_send_after_shutdown_does_not_block_calls() {
    let collector = TestCollector::start(200);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();
    assert!(capture.shutdown(Duration::from_secs(1)));

    let client = capture.blocking(client_fn(upstream));
    let response = client.execute(api_request()).unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(collector.received.recv_timeout(Duration::from_millis(200)).is_err());
}

#[cfg(feature = "http")]
#[tokio::test]
async fn test_async_layer_is_delivered_to_collector() {
    use http_body_util::{BodyExt, Full};
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    let collector = TestCollector::start(200);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();

    let service = ServiceBuilder::new()
        .layer(capture.http_layer())
        .service(service_fn(|_request: Request<Full<Bytes>>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Full::new(Bytes::from_static(&[0xff, 0xfe, 0x00])))
                    .unwrap(),
            )
        }));

    let request = Request::get("http://files.example.com/blob")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = service.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), &[0xff, 0xfe, 0x00]);

    assert!(capture.flush(Duration::from_secs(5)));
    let (_, record) = collector.next();
    assert_eq!(record["request"]["method"], "GET");
    assert_eq!(record["request"]["body"], Value::Null);
    assert_eq!(record["request"]["body_size"], 0);
    assert_eq!(record["response"]["status_code"], 404);
    assert_eq!(record["response"]["body"], "<binary: 3 bytes>");
    assert_eq!(record["response"]["body_size"], 3);
    assert_eq!(record["meta"]["library"], "hyper");
}

#[cfg(feature = "grpc")]
#[tokio::test]
async fn test_grpc_failure_is_delivered_to_collector() {
    use tonic::Status;

    let collector = TestCollector::start(200);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();
    let grpc = capture.grpc("dns:///ledger.internal:443");
    assert_eq!(grpc.host(), "ledger.internal");

    let status = grpc
        .unary(
            "/ledger.v1.Ledger/Post",
            tonic::Request::new(serde_json::json!({ "amount": 5 })),
            |_request| async {
                Err::<tonic::Response<Value>, _>(Status::unavailable("ledger down"))
            },
        )
        .await
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unavailable);

    assert!(capture.flush(Duration::from_secs(5)));
    let (_, record) = collector.next();
    assert_eq!(record["request"]["method"], "POST");
    assert_eq!(
        record["request"]["url"],
        "grpc://dns:///ledger.internal:443/ledger.v1.Ledger/Post"
    );
    assert_eq!(record["request"]["body"], "{\n  \"amount\": 5\n}");
    assert_eq!(record["response"]["status_code"], 503);
    assert_eq!(record["response"]["headers"]["grpc-status"], "14");
    assert_eq!(record["response"]["headers"]["grpc-status-name"], "UNAVAILABLE");
    assert_eq!(record["response"]["body"], "ledger down");
    assert_eq!(record["meta"]["library"], "grpc");
    assert!(record["meta"]["error"].as_str().is_some());
}

#[cfg(feature = "grpc")]
#[tokio::test]
async fn test_grpc_channel_layer_is_delivered_to_collector() {
    use http_body_util::StreamBody;
    use hyper::body::Frame;
    use hyper::http::uri::PathAndQuery;
    use hyper::HeaderMap;
    use tonic::body::BoxBody;
    use tonic::client::Grpc;
    use tonic::codec::ProstCodec;
    use tower::{service_fn, ServiceBuilder};

    let collector = TestCollector::start(200);
    let capture = Instrumentation::init(&collector.settings()).unwrap().unwrap();

    // Stands in for a connected tonic channel.
    let channel = service_fn(|_request: hyper::Request<BoxBody>| async {
        let mut trailers = HeaderMap::new();
        trailers.insert("grpc-status", "0".parse().unwrap());
        let frames: Vec<Result<Frame<Bytes>, Infallible>> = vec![
            Ok(Frame::data(Bytes::from_static(&[0, 0, 0, 0, 2, 0x20, 0x01]))),
            Ok(Frame::trailers(trailers)),
        ];
        Ok::<_, Infallible>(Response::new(StreamBody::new(futures::stream::iter(frames))))
    });
    let channel = ServiceBuilder::new()
        .layer(capture.grpc_layer("http://ledger.internal:443"))
        .service(channel);

    let mut grpc = Grpc::new(channel);
    grpc.ready().await.unwrap();
    let reply = grpc
        .unary(
            tonic::Request::new(prost_types::Value::default()),
            PathAndQuery::from_static("/ledger.v1.Ledger/Balance"),
            ProstCodec::<prost_types::Value, prost_types::Value>::default(),
        )
        .await
        .unwrap();
    assert!(matches!(
        reply.into_inner().kind,
        Some(prost_types::value::Kind::BoolValue(true))
    ));

    assert!(capture.flush(Duration::from_secs(5)));
    let (_, record) = collector.next();
    assert_eq!(record["request"]["url"], "grpc://ledger.internal:443/ledger.v1.Ledger/Balance");
    assert_eq!(record["response"]["status_code"], 200);
    assert_eq!(record["response"]["headers"]["grpc-status-name"], "OK");
    assert_eq!(record["response"]["body"], "<binary: 2 bytes>");
    assert_eq!(record["meta"]["library"], "grpc");
}
