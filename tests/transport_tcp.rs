//! End-to-end tests for the TCP transport against a plaintext endpoint.
//!
//! TLS-material handling is covered by unit tests in the backend; these
//! tests confirm the TCP carrier drives the same executor surface as the
//! Unix-socket one.

#![expect(
    clippy::expect_used,
    clippy::indexing_slicing,
    reason = "expect and literal indexing are standard practice in tests"
)]

use std::convert::Infallible;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use podlink::config::{ConnectionConfig, TransportOptions};
use podlink::transport::{PodmanTransport, connect};

async fn route(
    request: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let body = match request.uri().path() {
        "/v5.0.0/libpod/_ping" => "OK",
        "/v5.0.0/libpod/info" => "{\"host\":{\"hostname\":\"podman-host\"}}",
        _ => "{\"message\":\"unknown path\"}",
    };
    Ok(Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::copy_from_slice(body.as_bytes())))
        .expect("response should build"))
}

async fn engine_and_transport() -> PodmanTransport {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind a local port");
    let address = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = hyper::service::service_fn(route);
                let connection = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service);
                drop(connection.await);
            });
        }
    });
    // A trailing slash checks the base-URL normalisation on a live call.
    let uri = format!("http://{address}/");
    connect(
        &ConnectionConfig::Tcp { uri, tls: None },
        &TransportOptions::default(),
    )
    .await
    .expect("transport should build")
}

#[tokio::test]
async fn request_decodes_json_over_tcp() {
    let transport = engine_and_transport().await;
    let reply = transport
        .request(Method::GET, "/info", None)
        .await
        .expect("request should succeed");
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json.expect("body should decode")["host"]["hostname"],
        "podman-host"
    );
}

#[tokio::test]
async fn ping_succeeds_over_tcp() {
    let transport = engine_and_transport().await;
    transport.ping().await.expect("ping should succeed");
    transport.close().await;
    transport.close().await;
}
