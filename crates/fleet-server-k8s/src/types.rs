// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

pub use k8s_openapi::api::apps::v1::{
	DaemonSet, Deployment, DeploymentSpec, StatefulSet,
};
pub use k8s_openapi::api::batch::v1::Job;
pub use k8s_openapi::api::core::v1::{
	ConfigMap, ConfigMapEnvSource, Container, ContainerPort, EnvFromSource, EnvVar, Namespace, Pod,
	PodSpec, PodTemplateSpec, ResourceRequirements, Secret, SecretEnvSource, Service, ServicePort,
	ServiceSpec,
};
pub use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
pub use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// A pinned stream of raw output chunks from a followed container log.
pub type LogStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
	pub width: u16,
	pub height: u16,
}

/// A process running inside a container with its stdio wired to the caller.
///
/// With a TTY, stderr is merged into `stdout` and `resize` accepts new
/// terminal dimensions. Dropping `stdin` closes the remote process's input.
pub struct AttachedProcess {
	pub stdin: Pin<Box<dyn AsyncWrite + Send>>,
	pub stdout: Pin<Box<dyn AsyncRead + Send>>,
	pub resize: Option<mpsc::Sender<TerminalSize>>,
}
