// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WebSocket sessions on pods: followed logs and an interactive terminal.
//!
//! Both sessions are opened before the upgrade completes, so an unknown
//! cluster, a missing pod or a refused exec answers with the usual JSON error
//! instead of a socket that closes straight away.
//!
//! Terminal frames from the client are written to the process's stdin. A frame
//! starting with `0x01` and at least five bytes long is a resize request:
//! width and height follow as big-endian `u16`s.

use axum::{
	extract::{
		ws::{Message, WebSocket},
		Path, Query, State, WebSocketUpgrade,
	},
	response::Response,
};
use fleet_server_k8s::{AttachedProcess, ExecOptions, LogStream, TerminalSize, DEFAULT_SHELL};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::{api::AppState, error::ServerError, routes::workloads::LogsQuery};

const RESIZE_FRAME: u8 = 0x01;

#[derive(Debug, Default, Deserialize)]
pub struct ExecQuery {
	pub namespace: Option<String>,
	pub container: Option<String>,
	pub command: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum TerminalInput<'a> {
	Data(&'a [u8]),
	Resize(TerminalSize),
	Ignore,
}

fn decode_input(frame: &[u8]) -> TerminalInput<'_> {
	match frame {
		[RESIZE_FRAME, w0, w1, h0, h1, ..] => {
			let width = u16::from_be_bytes([*w0, *w1]);
			let height = u16::from_be_bytes([*h0, *h1]);
			if width > 0 && height > 0 {
				TerminalInput::Resize(TerminalSize { width, height })
			} else {
				TerminalInput::Ignore
			}
		}
		[RESIZE_FRAME, _, ..] => TerminalInput::Ignore,
		data => TerminalInput::Data(data),
	}
}

/// GET /api/clusters/{id}/pods/{name}/logs/stream (WebSocket)
///
/// Sends each log chunk as a text message and closes when the log ends.
pub async fn stream_pod_logs(
	State(state): State<AppState>,
	Path((id, name)): Path<(String, String)>,
	Query(query): Query<LogsQuery>,
	ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
	let opts = query.to_options()?;
	let logs = state
		.queries
		.stream_pod_logs(&id, query.namespace.as_deref(), &name, &opts)
		.await?;

	info!(cluster_id = %id, pod = %name, "streaming pod logs");
	Ok(ws.on_upgrade(move |socket| async move {
		forward_logs(socket, logs).await;
		debug!(cluster_id = %id, pod = %name, "log stream closed");
	}))
}

/// GET /api/clusters/{id}/pods/{name}/exec (WebSocket)
pub async fn exec_pod(
	State(state): State<AppState>,
	Path((id, name)): Path<(String, String)>,
	Query(query): Query<ExecQuery>,
	ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
	let command = query
		.command
		.filter(|c| !c.trim().is_empty())
		.unwrap_or_else(|| DEFAULT_SHELL.to_string());
	let opts = ExecOptions {
		container: query.container,
		command: vec![command],
		tty: true,
	};
	let process = state
		.queries
		.exec_pod(&id, query.namespace.as_deref(), &name, opts)
		.await?;

	info!(cluster_id = %id, pod = %name, "terminal session opened");
	Ok(ws.on_upgrade(move |socket| async move {
		run_terminal(socket, process).await;
		debug!(cluster_id = %id, pod = %name, "terminal session ended");
	}))
}

async fn forward_logs(mut socket: WebSocket, mut logs: LogStream) {
	loop {
		tokio::select! {
			chunk = logs.next() => match chunk {
				Some(Ok(bytes)) => {
					let text = String::from_utf8_lossy(&bytes).into_owned();
					if socket.send(Message::Text(text.into())).await.is_err() {
						return;
					}
				}
				Some(Err(e)) => {
					let notice = format!("log stream failed: {e}\n");
					let _ = socket.send(Message::Text(notice.into())).await;
					break;
				}
				None => break,
			},
			incoming = socket.recv() => match incoming {
				Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
				Some(Ok(_)) => {}
			},
		}
	}
	let _ = socket.send(Message::Close(None)).await;
}

async fn run_terminal(socket: WebSocket, process: AttachedProcess) {
	let AttachedProcess {
		mut stdin,
		mut stdout,
		resize,
	} = process;
	let (mut sender, mut receiver) = socket.split();

	let client_to_pod = async {
		while let Some(Ok(msg)) = receiver.next().await {
			let frame: &[u8] = match &msg {
				Message::Binary(data) => data,
				Message::Text(text) => text.as_str().as_bytes(),
				Message::Close(_) => break,
				_ => continue,
			};
			match decode_input(frame) {
				TerminalInput::Data(data) => {
					if stdin.write_all(data).await.is_err() {
						break;
					}
				}
				TerminalInput::Resize(size) => {
					if let Some(resize) = &resize {
						let _ = resize.send(size).await;
					}
				}
				TerminalInput::Ignore => {}
			}
		}
	};

	let pod_to_client = async {
		let mut buf = [0u8; 4096];
		loop {
			match stdout.read(&mut buf).await {
				Ok(0) | Err(_) => break,
				Ok(n) => {
					if sender
						.send(Message::Binary(buf[..n].to_vec().into()))
						.await
						.is_err()
					{
						return;
					}
				}
			}
		}
		let _ = sender.send(Message::Close(None)).await;
	};

	tokio::select! {
		_ = client_to_pod => {}
		_ = pod_to_client => {}
	}
}
