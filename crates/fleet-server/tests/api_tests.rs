// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP-level tests against an in-memory database and a mock cluster.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	body::Body,
	http::{Method, Request, StatusCode},
	Router,
};
use fleet_server::{create_app_state, create_router, REQUEST_IN_PROGRESS};
use fleet_server_config::ServerConfig;
use fleet_server_db::testing::create_test_pool;
use fleet_server_k8s::{MockClientFactory, MockClusterApi, ResourceKind};
use serde_json::{json, Value};
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
- name: prod
  context:
    cluster: staging-cluster
    user: admin
users:
- name: admin
  user:
    token: abc123
"#;

struct TestApp {
	router: Router,
	api: Arc<MockClusterApi>,
}

impl TestApp {
	async fn new() -> Self {
		let pool = create_test_pool().await;
		let api = Arc::new(MockClusterApi::with_namespaces(&[
			"default",
			"kube-system",
			"payments",
		]));
		let factory = Arc::new(MockClientFactory::new(Arc::clone(&api)));
		let state = create_app_state(pool, &ServerConfig::default(), factory);
		Self {
			router: create_router(state),
			api,
		}
	}

	async fn send(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
		let builder = Request::builder().method(method).uri(path);
		let request = match body {
			Some(body) => builder
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => builder.body(Body::empty()).unwrap(),
		};

		let response = self.router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let value = serde_json::from_slice(&bytes)
			.unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
		(status, value)
	}

	async fn upload_cluster(&self) -> String {
		let (status, body) = self
			.send(
				Method::POST,
				"/api/clusters",
				Some(json!({ "name": "staging", "kubeconfig": KUBECONFIG })),
			)
			.await;
		assert_eq!(status, StatusCode::CREATED, "{body}");
		body["id"].as_str().unwrap().to_string()
	}

	async fn create_app(&self, cluster_id: &str, name: &str) -> (StatusCode, Value) {
		self
			.send(
				Method::POST,
				"/api/applications",
				Some(json!({
					"name": name,
					"namespace": "default",
					"cluster_config_id": cluster_id,
					"image": "nginx:1.27",
				})),
			)
			.await
	}

	async fn wait_for_status(&self, app_id: &str, wanted: &str) {
		for _ in 0..100 {
			let (_, body) = self
				.send(Method::GET, &format!("/api/applications/{app_id}"), None)
				.await;
			if body["status"] == wanted {
				return;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("application {app_id} never reached {wanted}");
	}
}

#[tokio::test]
async fn test_health_reports_database() {
	let app = TestApp::new().await;
	let (status, body) = app.send(Method::GET, "/health", None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["status"], "healthy");
	assert_eq!(body["database"]["status"], "healthy");
}

#[tokio::test]
async fn test_cluster_upload_hides_credential() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;

	let (status, body) = app.send(Method::GET, &format!("/api/clusters/{id}"), None).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["current_context"], "staging");
	assert!(body.get("credential").is_none());

	let (_, list) = app.send(Method::GET, "/api/clusters", None).await;
	assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cluster_upload_rejects_garbage() {
	let app = TestApp::new().await;
	let (status, body) = app
		.send(
			Method::POST,
			"/api/clusters",
			Some(json!({ "name": "bad", "kubeconfig": "not a kubeconfig" })),
		)
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_set_context_validates_name() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;

	let (status, body) = app
		.send(
			Method::PUT,
			&format!("/api/clusters/{id}/context"),
			Some(json!({ "context": "prod" })),
		)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["current_context"], "prod");

	let (status, _) = app
		.send(
			Method::PUT,
			&format!("/api/clusters/{id}/context"),
			Some(json!({ "context": "nope" })),
		)
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_namespaces_are_listed_and_unknown_cluster_is_404() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;

	let (status, body) = app
		.send(Method::GET, &format!("/api/clusters/{id}/namespaces"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	let names: Vec<&str> = body
		.as_array()
		.unwrap()
		.iter()
		.map(|ns| ns["name"].as_str().unwrap())
		.collect();
	assert!(names.contains(&"payments"));

	let (status, body) = app
		.send(Method::GET, "/api/clusters/missing/namespaces", None)
		.await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_workload_listings_degrade_when_cluster_fails() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;
	app.api.seed_pod("default", "web-1", &[("app", "web")]);

	let (status, body) = app
		.send(Method::GET, &format!("/api/clusters/{id}/pods?namespace=default"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body[0]["name"], "web-1");

	app.api.set_fail_lists(true);
	let (status, body) = app
		.send(Method::GET, &format!("/api/clusters/{id}/deployments"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!([]));

	let (status, _) = app
		.send(Method::GET, &format!("/api/clusters/{id}/widgets"), None)
		.await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_pod_listing_answers_429() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;
	app.api.set_list_delay(Duration::from_millis(200));

	let path = format!("/api/clusters/{id}/pods?namespace=default");
	let (first, second) = tokio::join!(
		app.send(Method::GET, &path, None),
		app.send(Method::GET, &path, None)
	);

	let mut statuses = [first.0, second.0];
	statuses.sort();
	assert_eq!(statuses, [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);
	let rejected = if first.0 == StatusCode::TOO_MANY_REQUESTS {
		first.1
	} else {
		second.1
	};
	assert_eq!(rejected["error"], REQUEST_IN_PROGRESS);
}

#[tokio::test]
async fn test_generic_object_round_trip() {
	let app = TestApp::new().await;
	let id = app.upload_cluster().await;
	let base = format!("/api/clusters/{id}/resources/configmaps");

	let (status, _) = app
		.send(
			Method::POST,
			&format!("{base}?namespace=default"),
			Some(json!({ "metadata": { "name": "settings" }, "data": { "k": "v" } })),
		)
		.await;
	assert_eq!(status, StatusCode::CREATED);

	let (status, body) = app
		.send(Method::GET, &format!("{base}/settings?namespace=default"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["data"]["k"], "v");

	let (status, body) = app
		.send(Method::DELETE, &format!("{base}/settings?namespace=default"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["deleted"], true);

	let (status, body) = app
		.send(Method::DELETE, &format!("{base}/settings?namespace=default"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["deleted"], false);

	let (status, _) = app
		.send(Method::GET, &format!("{base}/settings?namespace=default"), None)
		.await;
	assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_application_lifecycle() {
	let app = TestApp::new().await;
	let cluster_id = app.upload_cluster().await;

	let (status, body) = app.create_app(&cluster_id, "demo").await;
	assert_eq!(status, StatusCode::CREATED, "{body}");
	assert_eq!(body["status"], "deploying");
	let app_id = body["id"].as_str().unwrap().to_string();

	app.wait_for_status(&app_id, "running").await;
	assert!(app.api.contains(ResourceKind::Deployment, "default", "demo"));
	assert!(app.api.contains(ResourceKind::Service, "default", "demo"));

	let (status, _) = app.create_app(&cluster_id, "demo").await;
	assert_eq!(status, StatusCode::CONFLICT);

	let (status, body) = app
		.send(Method::GET, &format!("/api/applications/{app_id}/status"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["application_id"], app_id.as_str());

	let (status, _) = app
		.send(Method::DELETE, &format!("/api/clusters/{cluster_id}"), None)
		.await;
	assert_eq!(status, StatusCode::CONFLICT);

	let (status, body) = app
		.send(Method::DELETE, &format!("/api/applications/{app_id}"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["record_deleted"], true);
	assert!(!app.api.contains(ResourceKind::Deployment, "default", "demo"));

	let (status, body) = app
		.send(Method::DELETE, &format!("/api/applications/{app_id}"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(body["record_deleted"], false);

	let (status, _) = app
		.send(Method::DELETE, &format!("/api/clusters/{cluster_id}"), None)
		.await;
	assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_application_for_unknown_cluster_is_404() {
	let app = TestApp::new().await;
	let (status, body) = app.create_app("missing", "demo").await;
	assert_eq!(status, StatusCode::NOT_FOUND);
	assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_application_name_is_validated() {
	let app = TestApp::new().await;
	let cluster_id = app.upload_cluster().await;
	let (status, _) = app.create_app(&cluster_id, "Not_Valid").await;
	assert_eq!(status, StatusCode::BAD_REQUEST);
}
