// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WebSocket pod sessions served over a real listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
	body::Body,
	http::{Method, Request, StatusCode},
};
use fleet_server::{create_app_state, create_router};
use fleet_server_config::ServerConfig;
use fleet_server_db::testing::create_test_pool;
use fleet_server_k8s::{MockClientFactory, MockClusterApi, TerminalSize};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;

const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: staging-cluster
  cluster:
    server: https://staging.example.com:6443
contexts:
- name: staging
  context:
    cluster: staging-cluster
    user: admin
users:
- name: admin
  user:
    token: abc123
"#;

struct SessionApp {
	addr: SocketAddr,
	api: Arc<MockClusterApi>,
	cluster_id: String,
}

impl SessionApp {
	async fn start() -> Self {
		let pool = create_test_pool().await;
		let api = Arc::new(MockClusterApi::with_namespaces(&["default"]));
		let factory = Arc::new(MockClientFactory::new(Arc::clone(&api)));
		let state = create_app_state(pool, &ServerConfig::default(), factory);
		let router = create_router(state);

		let request = Request::builder()
			.method(Method::POST)
			.uri("/api/clusters")
			.header("content-type", "application/json")
			.body(Body::from(
				json!({ "name": "staging", "kubeconfig": KUBECONFIG }).to_string(),
			))
			.unwrap();
		let response = router.clone().oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::CREATED);
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let body: Value = serde_json::from_slice(&bytes).unwrap();
		let cluster_id = body["id"].as_str().unwrap().to_string();

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, router).await.unwrap();
		});

		Self {
			addr,
			api,
			cluster_id,
		}
	}

	fn url(&self, path: &str) -> String {
		format!("ws://{}/api/clusters/{}{}", self.addr, self.cluster_id, path)
	}
}

#[tokio::test]
async fn test_followed_logs_arrive_as_text_then_close() {
	let app = SessionApp::start().await;
	app.api.seed_pod("default", "web-1", &[("app", "web")]);
	app.api
		.seed_logs("default", "web-1", &["booting", "listening on :8080", "ready"]);

	let (mut socket, _) = connect_async(app.url("/pods/web-1/logs/stream?namespace=default&tail_lines=2"))
		.await
		.unwrap();

	let mut received = String::new();
	while let Some(msg) = socket.next().await {
		match msg.unwrap() {
			Message::Text(text) => received.push_str(&text),
			Message::Close(_) => break,
			_ => {}
		}
	}
	assert_eq!(received, "listening on :8080\nready\n");
}

#[tokio::test]
async fn test_log_stream_for_missing_pod_is_refused_before_upgrade() {
	let app = SessionApp::start().await;

	let err = connect_async(app.url("/pods/ghost/logs/stream?namespace=default"))
		.await
		.err()
		.unwrap();
	match err {
		tokio_tungstenite::tungstenite::Error::Http(response) => {
			assert_eq!(response.status().as_u16(), 404);
		}
		other => panic!("expected an HTTP rejection, got {other:?}"),
	}
}

#[tokio::test]
async fn test_negative_tail_lines_rejected_on_stream() {
	let app = SessionApp::start().await;
	app.api.seed_pod("default", "web-1", &[]);

	let err = connect_async(app.url("/pods/web-1/logs/stream?namespace=default&tail_lines=-1"))
		.await
		.err()
		.unwrap();
	match err {
		tokio_tungstenite::tungstenite::Error::Http(response) => {
			assert_eq!(response.status().as_u16(), 400);
		}
		other => panic!("expected an HTTP rejection, got {other:?}"),
	}
}

#[tokio::test]
async fn test_terminal_relays_keystrokes_and_resizes() {
	let app = SessionApp::start().await;
	app.api.seed_pod("default", "web-1", &[("app", "web")]);

	let (mut socket, _) = connect_async(app.url("/pods/web-1/exec?namespace=default&container=app"))
		.await
		.unwrap();

	socket
		.send(Message::Binary(b"echo hi\n".to_vec()))
		.await
		.unwrap();
	let mut echoed = Vec::new();
	while echoed.len() < 8 {
		match tokio::time::timeout(Duration::from_secs(5), socket.next())
			.await
			.unwrap()
			.unwrap()
			.unwrap()
		{
			Message::Binary(data) => echoed.extend_from_slice(&data),
			other => panic!("unexpected frame {other:?}"),
		}
	}
	assert_eq!(echoed, b"echo hi\n");

	socket
		.send(Message::Binary(vec![0x01, 0x00, 0x50, 0x00, 0x18]))
		.await
		.unwrap();
	let wanted = TerminalSize {
		width: 80,
		height: 24,
	};
	for _ in 0..100 {
		if app.api.resizes().contains(&wanted) {
			break;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	assert_eq!(app.api.resizes(), vec![wanted]);

	let calls = app.api.exec_calls();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].pod, "web-1");
	assert_eq!(calls[0].options.container.as_deref(), Some("app"));
	assert_eq!(calls[0].options.command, vec!["/bin/sh".to_string()]);
	assert!(calls[0].options.tty);
}

#[tokio::test]
async fn test_terminal_for_missing_pod_is_404() {
	let app = SessionApp::start().await;

	let err = connect_async(app.url("/pods/ghost/exec?namespace=default&container=app"))
		.await
		.err()
		.unwrap();
	match err {
		tokio_tungstenite::tungstenite::Error::Http(response) => {
			assert_eq!(response.status().as_u16(), 404);
		}
		other => panic!("expected an HTTP rejection, got {other:?}"),
	}
	assert!(app.api.exec_calls().is_empty());
}
