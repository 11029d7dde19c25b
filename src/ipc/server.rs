//! TCP IPC server: accept loop and per-connection handler.
//!
//! Caller abort: while a request is being dispatched, the connection's read
//! side is watched. End of stream or a read error abandons the request, and
//! the slot reclaims the registration. A client that half-closes its write
//! side after sending `GetNextProcessEvent` has therefore aborted that call;
//! consumers must keep the connection fully open until the reply arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::ipc::codec::{read_frame, write_frame, MSG_ERROR, MSG_REQUEST, MSG_RESPONSE};
use crate::ipc::router;
use crate::kernel::KernelHandle;
use crate::types::{IpcConfig, Result};

/// Encode a JSON value to msgpack. Logs and returns an error on failure
/// instead of silently producing an empty vec.
fn encode_msgpack(value: &serde_json::Value) -> std::io::Result<Vec<u8>> {
    rmp_serde::to_vec_named(value).map_err(|e| {
        tracing::error!("Msgpack encoding failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })
}

fn error_payload(request_id: &str, code: &str, message: String) -> serde_json::Value {
    serde_json::json!({
        "id": request_id,
        "ok": false,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// IPC server in front of a running relay.
#[derive(Debug)]
pub struct IpcServer {
    kernel: KernelHandle,
    addr: SocketAddr,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
}

impl IpcServer {
    pub fn new(kernel: KernelHandle, addr: SocketAddr, ipc_config: IpcConfig) -> Self {
        Self {
            kernel,
            addr,
            cancel: CancellationToken::new(),
            ipc_config,
        }
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener until cancelled or a fatal error occurs.
    ///
    /// After cancellation, waits for every connection task to finish (bounded
    /// by the write timeout) before returning. A `CANCELLED` reply owed to a
    /// waiting client is therefore written before this future completes.
    pub async fn serve_on(&self, listener: TcpListener) -> std::io::Result<()> {
        let connections = TaskTracker::new();
        let result = self.accept_loop(&listener, &connections).await;

        connections.close();
        let drain = Duration::from_secs(self.ipc_config.write_timeout_secs);
        if tokio::time::timeout(drain, connections.wait()).await.is_err() {
            tracing::warn!(
                "{} IPC connection(s) still open after {}s drain",
                connections.len(),
                drain.as_secs(),
            );
        }
        result
    }

    async fn accept_loop(
        &self,
        listener: &TcpListener,
        connections: &TaskTracker,
    ) -> std::io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.ipc_config.max_connections));
        tracing::info!(
            "IPC server listening on {} (max_connections={})",
            listener.local_addr()?,
            self.ipc_config.max_connections,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = accept?;

                    // Acquire connection permit (backpressure when at capacity).
                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "Connection from {} rejected: at max_connections ({})",
                                peer,
                                self.ipc_config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!("IPC connection from {} (active={})",
                        peer,
                        self.ipc_config.max_connections - conn_semaphore.available_permits(),
                    );
                    let kernel = self.kernel.clone();
                    let cancel = self.cancel.clone();
                    let ipc_config = self.ipc_config.clone();
                    connections.spawn(async move {
                        if let Err(e) = handle_connection(stream, kernel, cancel, ipc_config, permit).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Handle a single TCP connection: read frames → dispatch → write responses.
async fn handle_connection(
    stream: TcpStream,
    kernel: KernelHandle,
    cancel: CancellationToken,
    ipc_config: IpcConfig,
    _permit: OwnedSemaphorePermit, // held for connection lifetime
) -> std::io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let read_timeout = Duration::from_secs(ipc_config.read_timeout_secs);
    let write_timeout = Duration::from_secs(ipc_config.write_timeout_secs);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame_result = tokio::time::timeout(read_timeout, read_frame(&mut reader, ipc_config.max_frame_bytes)) => {
                match frame_result {
                    Err(_elapsed) => {
                        tracing::debug!("Read timeout ({}s), dropping connection", ipc_config.read_timeout_secs);
                        break;
                    }
                    Ok(result) => match result? {
                        Some(f) => f,
                        None => break, // clean EOF
                    },
                }
            }
        };

        let (msg_type, payload_bytes) = frame;

        if msg_type != MSG_REQUEST {
            let err_payload = error_payload(
                "",
                "INVALID_ARGUMENT",
                format!("Unexpected message type: 0x{:02X}", msg_type),
            );
            timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&err_payload)?, write_timeout).await?;
            continue;
        }

        let request: serde_json::Value = match rmp_serde::from_slice(&payload_bytes) {
            Ok(v) => v,
            Err(e) => {
                let err_payload =
                    error_payload("", "INVALID_ARGUMENT", format!("Invalid msgpack: {}", e));
                timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&err_payload)?, write_timeout).await?;
                continue;
            }
        };

        let request_id = request
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let body = request
            .get("body")
            .cloned()
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let result = match router::resolve_code(&request) {
            Ok(code) => {
                tracing::debug!(request_id = %request_id, "dispatching {}", code);
                match dispatch_while_connected(&kernel, code, body, &mut reader, &cancel).await {
                    Some(result) => result,
                    None => break,
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(response_body) => {
                let response = serde_json::json!({
                    "id": request_id,
                    "ok": true,
                    "body": response_body,
                });
                timed_write(&mut writer, MSG_RESPONSE, &encode_msgpack(&response)?, write_timeout).await?;
            }
            Err(e) => {
                let response = error_payload(&request_id, e.to_ipc_error_code(), e.to_string());
                timed_write(&mut writer, MSG_ERROR, &encode_msgpack(&response)?, write_timeout).await?;
            }
        }
    }

    Ok(())
}

/// Run a dispatch while watching the peer.
///
/// Returns `None` when the peer reaches end of stream (including a half-close
/// of its write side), fails a read, or the server is cancelled before the
/// operation completes; the dispatch future is dropped, which abandons any
/// outstanding wait. Completion is polled first: a wait cancelled by relay
/// shutdown still answers `CANCELLED`.
async fn dispatch_while_connected(
    kernel: &KernelHandle,
    code: router::ControlCode,
    body: serde_json::Value,
    reader: &mut OwnedReadHalf,
    cancel: &CancellationToken,
) -> Option<Result<serde_json::Value>> {
    let dispatch = router::dispatch(kernel, code, body);
    tokio::pin!(dispatch);

    let mut peek_buf = [0u8; 1];
    let mut watching_peer = true;
    loop {
        tokio::select! {
            biased;
            result = &mut dispatch => return Some(result),
            _ = cancel.cancelled() => return None,
            peeked = reader.peek(&mut peek_buf), if watching_peer => match peeked {
                Ok(0) | Err(_) => {
                    tracing::debug!("peer disconnected during {}; abandoning request", code);
                    return None;
                }
                // A pipelined request is waiting; it is read after this one completes.
                Ok(_) => watching_peer = false,
            },
        }
    }
}

/// Write a frame with a timeout. Returns an error if the write takes too long
/// (prevents slow consumers from holding connections indefinitely).
async fn timed_write<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg_type: u8,
    payload: &[u8],
    timeout: Duration,
) -> std::io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, msg_type, payload))
        .await
        .map_err(|_| {
            tracing::warn!("Write timeout ({}s), dropping connection", timeout.as_secs());
            std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout")
        })?
}
