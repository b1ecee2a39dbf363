// sync/mod.rs — Realtime synchronization server.
//
// WebSocket transport carrying `{"event", "data"}` envelopes. One task per
// accepted connection; each connection multiplexes its inbound frames with
// the shared broadcast stream and forwards only the broadcasts whose
// audience it matches.

pub mod event;
pub mod handlers;
pub mod session;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::sync::event::{server_event, Audience, ClientEvent};
use crate::AppContext;

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "sync server listening");

    // Pinned: the accept loop polls it on every select! iteration.
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping sync server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("sync server stopped");
    Ok(())
}

/// Resolves once the process has been asked to stop: SIGTERM or Ctrl-C on
/// Unix, Ctrl-C alone everywhere else.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler registration");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    let session_id = ctx.sessions.register().await;
    let mut broadcast_rx = ctx.broadcaster.subscribe();

    // Owners this connection has referenced (fetch or mutation). Owner-scoped
    // broadcasts are forwarded only when their owner is in this set — the
    // connection itself is anonymous.
    let mut watched: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            // Incoming frame from the client
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = dispatch_text(&text, &ctx, &mut watched).await;
                        if let Some(reply) = reply {
                            if let Err(e) = sink.send(Message::Text(reply)).await {
                                warn!(err = %e, "send error");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(err = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }
            // Outgoing broadcast frame
            outbound = broadcast_rx.recv() => {
                match outbound {
                    Ok(out) => {
                        let wanted = match &out.audience {
                            Audience::Global => true,
                            Audience::Owner(owner) => watched.contains(owner),
                        };
                        if wanted {
                            if let Err(e) = sink.send(Message::Text(out.payload)).await {
                                warn!(err = %e, "broadcast send error");
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "broadcast lagged");
                    }
                }
            }
        }
    }

    // Disconnection carries no compensating action — the registry just
    // forgets the connection existed.
    ctx.sessions.unregister(session_id).await;
    debug!(session_id, "connection closed");
    Ok(())
}

/// Decode one inbound frame and dispatch it. Returns the reply frame, if
/// any. An unparseable envelope gets a malformed-payload ack; an
/// unrecognized event name gets nothing at all.
pub async fn dispatch_text(
    text: &str,
    ctx: &AppContext,
    watched: &mut HashSet<String>,
) -> Option<String> {
    let evt: ClientEvent = match serde_json::from_str(text) {
        Ok(evt) => evt,
        Err(e) => {
            debug!(err = %e, "unparseable frame");
            let ack = json!({
                "for": serde_json::Value::Null,
                "ok": false,
                "error": { "code": "malformed-payload", "message": e.to_string() }
            });
            return Some(server_event("ack", ack));
        }
    };

    debug!(event = %evt.event, "dispatch");
    let (reply, watch) = handlers::dispatch(&evt.event, evt.data, ctx).await?;
    if let Some(owner) = watch {
        watched.insert(owner);
    }
    Some(reply)
}
