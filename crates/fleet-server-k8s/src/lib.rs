// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Cluster client abstraction for Fleet.
//!
//! This crate provides:
//! - A trait-based cluster client abstraction for testability
//! - Production implementation using the kube crate, with bounded call timeouts
//! - Credential bundle decoding (raw kubeconfig, base64, `data:` URLs)
//! - Followed log streams and interactive exec sessions
//! - An in-memory mock cluster for tests (`test-support` feature)

mod client;
mod credential;
mod error;
mod kind;
mod kube_client;
#[cfg(any(test, feature = "test-support"))]
mod mock;
mod types;

pub use client::{ClientFactory, ClusterApi};
pub use credential::{
	decode_credential, load_credential, parse_kubeconfig, server_for_context, summarize,
	ClusterCredential, CredentialSummary,
};
pub use error::{K8sError, K8sResult};
pub use kind::{
	DeleteOptions, ExecOptions, LogOptions, PropagationPolicy, ResourceKind, DEFAULT_SHELL,
};
pub use kube_client::{KubeClientFactory, KubeClusterClient};
#[cfg(any(test, feature = "test-support"))]
pub use mock::{DeleteCall, ExecCall, MockClientFactory, MockClusterApi};
pub use types::{
	AttachedProcess, ConfigMap, ConfigMapEnvSource, Container, ContainerPort, DaemonSet, Deployment,
	DeploymentSpec, EnvFromSource, EnvVar, IntOrString, Job, LabelSelector, LogStream, Namespace,
	ObjectMeta, Pod, PodSpec, PodTemplateSpec, Quantity, ResourceRequirements, Secret,
	SecretEnvSource, Service, ServicePort, ServiceSpec, StatefulSet, TerminalSize,
};
