// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Decoding and inspection of uploaded cluster credential bundles.
//!
//! Bundles arrive either as raw kubeconfig YAML, as base64 of that YAML, or as
//! a `data:` URL wrapping base64. Decoding never falls back silently: content
//! that is neither valid base64 nor a parseable kubeconfig is rejected.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use kube::config::Kubeconfig;

use crate::error::{K8sError, K8sResult};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A decoded credential ready to build a client from.
#[derive(Debug, Clone)]
pub struct ClusterCredential {
	pub kubeconfig: Kubeconfig,
	/// Context to activate. `None` uses the bundle's `current-context`.
	pub context: Option<String>,
}

/// Connection metadata extracted from a kubeconfig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
	pub current_context: String,
	pub server_url: String,
	pub contexts: Vec<String>,
}

/// Decode stored credential content into kubeconfig text.
pub fn decode_credential(content: &str) -> K8sResult<String> {
	let trimmed = content.trim();
	if trimmed.is_empty() {
		return Err(invalid("credential content is empty"));
	}

	if trimmed.starts_with(DATA_URL_PREFIX) || trimmed.contains(BASE64_MARKER) {
		let parts: Vec<&str> = trimmed.split(',').collect();
		if parts.len() != 2 {
			return Err(invalid("malformed data URL"));
		}
		return decode_base64(parts[1]);
	}

	match decode_base64(trimmed) {
		Ok(text) => Ok(text),
		Err(_) => {
			parse_kubeconfig(trimmed)?;
			Ok(trimmed.to_string())
		}
	}
}

/// Parse kubeconfig YAML.
pub fn parse_kubeconfig(text: &str) -> K8sResult<Kubeconfig> {
	Kubeconfig::from_yaml(text).map_err(|e| invalid(&format!("not a kubeconfig: {e}")))
}

/// Decode and parse stored content, selecting `context` when given.
pub fn load_credential(content: &str, context: Option<&str>) -> K8sResult<ClusterCredential> {
	let text = decode_credential(content)?;
	let kubeconfig = parse_kubeconfig(&text)?;

	if let Some(name) = context {
		if !kubeconfig.contexts.iter().any(|c| c.name == name) {
			return Err(invalid(&format!("context '{name}' not present in kubeconfig")));
		}
	}

	Ok(ClusterCredential {
		kubeconfig,
		context: context.map(str::to_string),
	})
}

/// Extract the active context and its cluster's server URL.
///
/// A bundle without a `current-context` cannot be used and is rejected.
pub fn summarize(kubeconfig: &Kubeconfig) -> K8sResult<CredentialSummary> {
	let current_context = kubeconfig
		.current_context
		.clone()
		.filter(|c| !c.is_empty())
		.ok_or_else(|| invalid("kubeconfig has no current-context"))?;

	Ok(CredentialSummary {
		server_url: server_for_context(kubeconfig, &current_context).unwrap_or_default(),
		contexts: kubeconfig.contexts.iter().map(|c| c.name.clone()).collect(),
		current_context,
	})
}

/// Server URL of the cluster referenced by `context`, if both exist.
pub fn server_for_context(kubeconfig: &Kubeconfig, context: &str) -> Option<String> {
	let cluster_name = kubeconfig
		.contexts
		.iter()
		.find(|c| c.name == context)
		.and_then(|c| c.context.as_ref())
		.map(|c| c.cluster.clone())?;

	kubeconfig
		.clusters
		.iter()
		.find(|c| c.name == cluster_name)
		.and_then(|c| c.cluster.as_ref())
		.and_then(|c| c.server.clone())
}

fn decode_base64(payload: &str) -> K8sResult<String> {
	let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
	let bytes = STANDARD
		.decode(compact.as_bytes())
		.map_err(|e| invalid(&format!("invalid base64: {e}")))?;
	String::from_utf8(bytes).map_err(|_| invalid("decoded credential is not UTF-8"))
}

fn invalid(message: &str) -> K8sError {
	K8sError::InvalidCredential {
		message: message.to_string(),
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use proptest::prelude::*;

	pub(crate) const SAMPLE_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
current-context: staging
clusters:
- name: staging-cluster
  cluster:
    server: https://staging.example.com:6443
- name: prod-cluster
  cluster:
    server: https://prod.example.com:6443
contexts:
- name: staging
  context:
    cluster: staging-cluster
    user: deployer
- name: prod
  context:
    cluster: prod-cluster
    user: deployer
users:
- name: deployer
  user:
    token: abc123
"#;

	#[test]
	fn raw_yaml_passes_through() {
		let text = decode_credential(SAMPLE_KUBECONFIG).unwrap();
		assert_eq!(text, SAMPLE_KUBECONFIG.trim());
	}

	#[test]
	fn base64_content_is_decoded() {
		let encoded = STANDARD.encode(SAMPLE_KUBECONFIG);
		let text = decode_credential(&encoded).unwrap();
		assert_eq!(text, SAMPLE_KUBECONFIG);
	}

	#[test]
	fn data_url_prefix_is_stripped() {
		let url = format!(
			"data:application/octet-stream;base64,{}",
			STANDARD.encode(SAMPLE_KUBECONFIG)
		);
		let text = decode_credential(&url).unwrap();
		assert_eq!(text, SAMPLE_KUBECONFIG);
	}

	#[test]
	fn data_url_with_bad_payload_is_terminal() {
		let err = decode_credential("data:text/plain;base64,@@@not-base64@@@").unwrap_err();
		assert!(matches!(err, K8sError::InvalidCredential { .. }));
	}

	#[test]
	fn data_url_with_extra_commas_is_rejected() {
		let err = decode_credential("data:text/plain;base64,abc,def").unwrap_err();
		assert!(matches!(err, K8sError::InvalidCredential { .. }));
	}

	#[test]
	fn empty_content_is_rejected() {
		assert!(decode_credential("   ").is_err());
	}

	#[test]
	fn garbage_is_rejected_not_passed_through() {
		let err = decode_credential("%%% definitely: [not a kubeconfig").unwrap_err();
		assert!(matches!(err, K8sError::InvalidCredential { .. }));
	}

	#[test]
	fn summarize_extracts_context_and_server() {
		let kc = parse_kubeconfig(SAMPLE_KUBECONFIG).unwrap();
		let summary = summarize(&kc).unwrap();
		assert_eq!(summary.current_context, "staging");
		assert_eq!(summary.server_url, "https://staging.example.com:6443");
		assert_eq!(summary.contexts, vec!["staging", "prod"]);
	}

	#[test]
	fn summarize_requires_current_context() {
		let without = SAMPLE_KUBECONFIG.replace("current-context: staging\n", "");
		let kc = parse_kubeconfig(&without).unwrap();
		assert!(summarize(&kc).is_err());
	}

	#[test]
	fn load_credential_validates_requested_context() {
		let cred = load_credential(SAMPLE_KUBECONFIG, Some("prod")).unwrap();
		assert_eq!(cred.context.as_deref(), Some("prod"));
		assert_eq!(
			server_for_context(&cred.kubeconfig, "prod").as_deref(),
			Some("https://prod.example.com:6443")
		);

		assert!(load_credential(SAMPLE_KUBECONFIG, Some("missing")).is_err());
	}

	proptest! {
		#[test]
		fn base64_of_kubeconfig_always_decodes(padding in "[ \n\t]{0,4}") {
			let encoded = format!("{padding}{}{padding}", STANDARD.encode(SAMPLE_KUBECONFIG));
			let text = decode_credential(&encoded).unwrap();
			prop_assert_eq!(text, SAMPLE_KUBECONFIG);
		}

		#[test]
		fn decode_never_panics(input in ".{0,200}") {
			let _ = decode_credential(&input);
		}
	}
}
