use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use lobby_types::events::GatewayCommand;

use crate::Hub;
use crate::dispatcher::{Outbound, OutboundRx};
use crate::session::Session;

/// Consecutive unanswered pings before the connection is dropped.
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Drive one WebSocket connection from upgrade to close.
///
/// Inbound frames are decoded and handed to the [`Session`] one at a time,
/// each processed to completion before the next is read. Outbound events
/// are written by a separate task so a slow client never blocks fan-out.
pub async fn handle_connection(socket: WebSocket, hub: Hub) {
    let (sender, mut receiver) = socket.split();
    let (mut session, outbound_rx) = Session::new(hub.clone());
    let conn_id = session.conn_id();
    info!("Connection {} opened", conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let mut send_task = tokio::spawn(write_loop(
        sender,
        outbound_rx,
        pong_received.clone(),
        hub.config.heartbeat_interval,
    ));

    let auth_deadline = tokio::time::sleep(hub.config.auth_timeout);
    tokio::pin!(auth_deadline);

    loop {
        tokio::select! {
            // Writer finished: close requested, heartbeat timeout, or socket gone.
            _ = &mut send_task => break,

            _ = &mut auth_deadline, if !session.is_authenticated() => {
                warn!("Connection {} did not authenticate in time, closing", conn_id);
                break;
            }

            frame = receiver.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    _ => break,
                };

                match msg {
                    Message::Text(text) => {
                        match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                            Ok(cmd) => session.handle(cmd).await,
                            Err(e) => {
                                warn!(
                                    "Connection {} bad command: {} -- raw: {}",
                                    conn_id,
                                    e,
                                    text.as_str().chars().take(200).collect::<String>()
                                );
                            }
                        }
                    }
                    Message::Pong(_) => {
                        pong_received.store(true, Ordering::Release);
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    send_task.abort();
    session.close().await;
    info!("Connection {} closed", conn_id);
}

async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: OutboundRx,
    pong_received: Arc<AtomicBool>,
    heartbeat_interval: std::time::Duration,
) {
    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Event(event)) => {
                        let text = match serde_json::to_string(&*event) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to encode outbound event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if pong_received.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}
