//! Execution Bridge
//!
//! Parses run on a dedicated OS thread with its own single-threaded runtime,
//! so a hung or panicking parser never stalls the coordinator. The
//! coordinator sends one request and waits for exactly one reply before the
//! next request goes out.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use uuid::Uuid;

use super::ParseService;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::types::ParseResult;

const THREAD_NAME: &str = "parse-bridge";

/// Request sent into the execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeRequest {
    pub request_id: u64,
    pub file_id: Uuid,
}

/// The single reply to a [`BridgeRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BridgeReply {
    Success {
        request_id: u64,
        file_id: Uuid,
        result: ParseResult,
    },
    Error {
        request_id: u64,
        file_id: Uuid,
        error: String,
    },
}

impl BridgeReply {
    pub fn request_id(&self) -> u64 {
        match self {
            BridgeReply::Success { request_id, .. } | BridgeReply::Error { request_id, .. } => {
                *request_id
            }
        }
    }

    pub fn file_id(&self) -> Uuid {
        match self {
            BridgeReply::Success { file_id, .. } | BridgeReply::Error { file_id, .. } => *file_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BridgeReply::Success { .. })
    }
}

struct Channel {
    requests: mpsc::UnboundedSender<BridgeRequest>,
    replies: mpsc::UnboundedReceiver<BridgeReply>,
}

/// Coordinator-side handle to the execution context
pub struct ExecutionBridge {
    // Held for the whole request/reply exchange: one request in flight
    channel: Mutex<Channel>,
    next_request_id: AtomicU64,
    reply_timeout: Duration,
    thread: std::thread::JoinHandle<()>,
}

impl ExecutionBridge {
    /// Start the execution context and wait until it reports readiness.
    /// A context that fails to come up is a fatal error.
    pub async fn start(service: ParseService, config: &BridgeConfig) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<(), String>>();
        let parse_timeout = config.parse_timeout();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("Failed to build runtime: {}", e)));
                        return;
                    }
                };

                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                runtime.block_on(serve(service, parse_timeout, request_rx, reply_tx));
                tracing::info!("Execution context stopped");
            })
            .map_err(|e| Error::bridge(format!("Failed to spawn execution context: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(Error::bridge(message)),
            Err(_) => {
                return Err(Error::bridge(
                    "Execution context exited before signalling readiness",
                ))
            }
        }

        tracing::info!(
            "Execution bridge ready (parse timeout {}s)",
            parse_timeout.as_secs()
        );

        Ok(Self {
            channel: Mutex::new(Channel {
                requests: request_tx,
                replies: reply_rx,
            }),
            next_request_id: AtomicU64::new(1),
            reply_timeout: config.reply_timeout(),
            thread,
        })
    }

    /// Whether the execution context thread is still alive
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Parse `file_id` in the execution context and wait for its reply.
    ///
    /// `Err` means the bridge itself failed (stopped context, no reply in
    /// time). A parse failure comes back as `Ok(BridgeReply::Error)`.
    pub async fn parse(&self, file_id: Uuid) -> Result<BridgeReply> {
        let mut channel = self.channel.lock().await;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        channel
            .requests
            .send(BridgeRequest { request_id, file_id })
            .map_err(|_| Error::bridge("Execution context has stopped"))?;

        let deadline = tokio::time::Instant::now() + self.reply_timeout;
        loop {
            match tokio::time::timeout_at(deadline, channel.replies.recv()).await {
                Err(_) => {
                    return Err(Error::bridge(format!(
                        "No reply for file {} within {}s",
                        file_id,
                        self.reply_timeout.as_secs()
                    )))
                }
                Ok(None) => return Err(Error::bridge("Execution context has stopped")),
                Ok(Some(reply)) if reply.request_id() == request_id => return Ok(reply),
                Ok(Some(stale)) => {
                    tracing::warn!(
                        "Discarding stale reply {} for file {}",
                        stale.request_id(),
                        stale.file_id()
                    );
                }
            }
        }
    }
}

/// Request loop inside the execution context
async fn serve(
    service: ParseService,
    parse_timeout: Duration,
    mut requests: mpsc::UnboundedReceiver<BridgeRequest>,
    replies: mpsc::UnboundedSender<BridgeReply>,
) {
    while let Some(request) = requests.recv().await {
        let reply = handle(&service, parse_timeout, request).await;
        if replies.send(reply).is_err() {
            break;
        }
    }
}

async fn handle(service: &ParseService, parse_timeout: Duration, request: BridgeRequest) -> BridgeReply {
    let BridgeRequest { request_id, file_id } = request;

    let outcome = AssertUnwindSafe(tokio::time::timeout(parse_timeout, service.parse_file(file_id)))
        .catch_unwind()
        .await;

    let error = match outcome {
        Ok(Ok(Ok(result))) => {
            return BridgeReply::Success {
                request_id,
                file_id,
                result,
            }
        }
        Ok(Ok(Err(e))) => e.to_string(),
        Ok(Err(_)) => format!("Parse timed out after {}s", parse_timeout.as_secs()),
        Err(panic) => format!("Parser panicked: {}", panic_message(panic.as_ref())),
    };

    BridgeReply::Error {
        request_id,
        file_id,
        error,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
