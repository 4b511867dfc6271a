//! The ping/pong heartbeat loop. Each call to [`spawn`] starts a new
//! "generation": a background task tied to a `watch` channel whose sender
//! is held by the returned [`Generation`] handle. Dropping the handle (on
//! upgrade or close) makes every `changed()` await in the generation's
//! tasks resolve, which they treat as "stop". Grounded in
//! `original_source/session.go`'s `heartbeat` goroutine.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::{interval, sleep};

use crate::handler::DisconnectReason;
use crate::packet::Packet;
use crate::sock::Socket;

pub(crate) struct Generation {
    _stop_tx: watch::Sender<()>,
}

pub(crate) fn spawn<D>(
    socket: Arc<Socket<D>>,
    ping_interval: Duration,
    ping_timeout: Duration,
) -> Generation
where
    D: Default + Send + Sync + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(());
    tokio::spawn(run(socket, ping_interval, ping_timeout, stop_rx));
    Generation { _stop_tx: stop_tx }
}

async fn run<D>(
    socket: Arc<Socket<D>>,
    ping_interval: Duration,
    ping_timeout: Duration,
    mut stop_rx: watch::Receiver<()>,
) where
    D: Default + Send + Sync + 'static,
{
    let mut ticker = interval(ping_interval);
    ticker.tick().await; // the first tick fires immediately; the handshake already happened

    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = ticker.tick() => {}
        }

        let socket = socket.clone();
        let mut stop_rx = stop_rx.clone();
        tokio::spawn(async move {
            // The write races the timeout rather than gating it: on the
            // polling carrier it only completes once a GET parks, and a
            // client that stops polling must still be timed out.
            tokio::spawn({
                let socket = socket.clone();
                async move {
                    let _ = socket.write_packet_once(Packet::ping(Bytes::new())).await;
                }
            });
            tokio::select! {
                _ = stop_rx.changed() => {}
                _ = socket.wait_pong() => {}
                _ = sleep(ping_timeout) => {
                    socket.close(DisconnectReason::PingTimeout).await;
                }
            }
        });
    }
}
