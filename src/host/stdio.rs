//! Stdin/stdout JSON bridge for the control channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages from stdin,
//! dispatches them through the `HostCommandServer` router, and writes
//! `ResponseEnvelope` and `EventEnvelope` messages as newline-delimited
//! JSON to stdout.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::error::{ReminderError, Result};
use crate::host::channel::{ControlHandler, HostCommandClient, command_channel_with_events};
use crate::host::contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, broadcast};

/// Default request channel capacity for the stdio bridge.
const REQUEST_CAPACITY: usize = 64;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the JSON bridge over the process's stdin/stdout until stdin closes
/// or a `shutdown` command is received.
///
/// Events sent on `event_tx` (scheduler events and router events alike)
/// are written to stdout interleaved with responses.
pub async fn run_stdio_bridge<H: ControlHandler>(
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> Result<()> {
    run_json_bridge(tokio::io::stdin(), tokio::io::stdout(), handler, event_tx).await
}

/// Run the bridge over arbitrary line-oriented streams.
///
/// Three concurrent tasks operate in parallel:
///
/// 1. **Reader** -- reads newline-delimited JSON from `input`, dispatches
///    each `CommandEnvelope` through the client, and writes the resulting
///    `ResponseEnvelope` to `output`.
/// 2. **Event forwarder** -- writes broadcast `EventEnvelope` messages as
///    JSON lines to `output`.
/// 3. **Server** -- runs the `HostCommandServer` router loop.
///
/// The bridge exits when the reader finishes (EOF or `shutdown`). Dropping
/// the client causes the server task to exit naturally.
pub async fn run_json_bridge<R, W, H>(
    input: R,
    output: W,
    handler: H,
    event_tx: broadcast::Sender<EventEnvelope>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    H: ControlHandler,
{
    let (client, server) = command_channel_with_events(REQUEST_CAPACITY, event_tx, handler);
    let writer = Arc::new(Mutex::new(BufWriter::new(output)));

    let server_handle = tokio::spawn(async move {
        server.run().await;
    });

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(input, client, Arc::clone(&writer)).await;

    event_handle.abort();
    let _ = event_handle.await;
    let _ = server_handle.await;

    reader_result
}

async fn run_reader<R, W>(
    input: R,
    client: HostCommandClient,
    writer: SharedWriter<W>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(input);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| ReminderError::Channel(format!("failed to read control input: {e}")))?;

        if bytes_read == 0 {
            tracing::info!("control input closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    raw_line = %trimmed,
                    "failed to parse command envelope"
                );
                let error_response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &error_response).await?;
                continue;
            }
        };

        let is_shutdown = envelope.command == CommandName::Shutdown;
        let request_id = envelope.request_id.clone();

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "control command dispatch failed");
                let id = if request_id.trim().is_empty() {
                    "dispatch-error".to_owned()
                } else {
                    request_id
                };
                ResponseEnvelope::error(id, format!("dispatch failed: {e}"))
            }
        };

        write_response(&writer, &response).await?;

        if is_shutdown && response.ok {
            tracing::info!("shutdown received; stopping bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| ReminderError::Contract(format!("failed to serialize response: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| ReminderError::Channel(format!("failed to write control output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| ReminderError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| ReminderError::Channel(format!("failed to flush control output: {e}")))?;
    Ok(())
}
