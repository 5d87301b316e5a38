//! Subscriber lifecycle: register, pump the outbound queue, watch for
//! disconnect, deregister.
//!
//! ```text
//! Connecting ──upgrade──▶ Registered ──disconnect/evict/shutdown──▶ Deregistering ──▶ Closed
//! ```
//!
//! The socket is split. A spawned writer drains the connection's queue into
//! the sink, bounding every write with the send timeout and interleaving
//! heartbeat pings. The read half only detects disconnection; inbound frames
//! are discarded.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::broadcast::Broadcaster;
use super::connection::{DeliveryError, SubscriberConnection};
use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Why the read side stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer sent a close frame.
    PeerClosed,
    /// Stream ended without a close frame.
    Eof,
    /// Transport error while reading.
    ReadError,
    /// Removed by the broadcaster or the writer.
    Evicted,
    /// Server is shutting down.
    Shutdown,
}

/// Why the writer stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterExit {
    /// The connection was removed; a close frame was attempted.
    Closed,
    /// A write failed or missed its deadline; the subscriber was evicted.
    Failed(DeliveryError),
}

/// Runs subscriber connections against a shared broadcaster.
pub struct SubscriberLifecycle {
    broadcaster: Arc<Broadcaster>,
    queue_capacity: usize,
    send_timeout: Duration,
    heartbeat_interval: Option<Duration>,
    shutdown: CancellationToken,
}

impl SubscriberLifecycle {
    /// Create a lifecycle driver. `shutdown` ends every running connection.
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        config: &ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            broadcaster,
            queue_capacity: config.queue_capacity,
            send_timeout: config.send_timeout,
            heartbeat_interval: config.heartbeat_interval,
            shutdown,
        }
    }

    fn registry(&self) -> &ConnectionRegistry {
        self.broadcaster.registry()
    }

    /// Serve an upgraded WebSocket until it disconnects.
    pub async fn run(&self, socket: WebSocket) -> Disconnect {
        let (sink, stream) = socket.split();
        self.serve(sink, stream).await
    }

    /// Serve any frame sink/stream pair until it disconnects.
    pub async fn serve<W, R, E>(&self, sink: W, stream: R) -> Disconnect
    where
        W: Sink<Message> + Send + Unpin + 'static,
        W::Error: Display + Send,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: Display,
    {
        let (conn, rx) = SubscriberConnection::channel(self.queue_capacity);
        let _ = self.registry().add(Arc::clone(&conn));
        metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
        info!(conn_id = conn.id(), subscribers = self.registry().len(), "subscriber connected");

        let writer = tokio::spawn(write_loop(
            sink,
            rx,
            Arc::clone(&conn),
            Arc::clone(&self.broadcaster),
            self.send_timeout,
            self.heartbeat_interval,
        ));

        let reason = read_loop(stream, conn.close_token(), &self.shutdown).await;

        let _ = self.registry().remove(conn.id());
        let exit = writer.await.ok();

        metrics::counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        metrics::histogram!(WS_CONNECTION_DURATION_SECONDS).record(conn.age().as_secs_f64());
        info!(
            conn_id = conn.id(),
            ?reason,
            ?exit,
            subscribers = self.registry().len(),
            "subscriber disconnected"
        );
        reason
    }
}

/// Wait for the disconnect trigger, discarding inbound frames.
pub async fn read_loop<R, E>(
    mut stream: R,
    close: &CancellationToken,
    shutdown: &CancellationToken,
) -> Disconnect
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            () = close.cancelled() => return Disconnect::Evicted,
            () = shutdown.cancelled() => return Disconnect::Shutdown,
            frame = stream.next() => match frame {
                None => return Disconnect::Eof,
                Some(Err(e)) => {
                    debug!(error = %e, "subscriber read error");
                    return Disconnect::ReadError;
                }
                Some(Ok(Message::Close(_))) => return Disconnect::PeerClosed,
                Some(Ok(_)) => trace!("discarding inbound frame"),
            }
        }
    }
}

/// Drain `rx` into `sink` until the connection closes or a write fails.
///
/// A failed or late write evicts the connection through `broadcaster`.
pub async fn write_loop<W>(
    mut sink: W,
    mut rx: mpsc::Receiver<Arc<str>>,
    conn: Arc<SubscriberConnection>,
    broadcaster: Arc<Broadcaster>,
    send_timeout: Duration,
    heartbeat_interval: Option<Duration>,
) -> WriterExit
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = heartbeat_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let exit = loop {
        let frame = tokio::select! {
            biased;
            () = conn.close_token().cancelled() => break WriterExit::Closed,
            payload = rx.recv() => match payload {
                Some(payload) => Message::Text(String::from(&*payload).into()),
                None => break WriterExit::Closed,
            },
            () = next_tick(&mut ping) => Message::Ping(Bytes::new()),
        };

        match tokio::time::timeout(send_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(conn_id = conn.id(), error = %e, "subscriber write failed");
                break WriterExit::Failed(DeliveryError::Closed);
            }
            Err(_) => break WriterExit::Failed(DeliveryError::Timeout),
        }
    };

    match exit {
        WriterExit::Failed(error) => {
            let _ = broadcaster.evict(conn.id(), error);
        }
        WriterExit::Closed => {
            let close = Message::Close(Some(CloseFrame {
                code: close_code::NORMAL,
                reason: Utf8Bytes::from_static(""),
            }));
            let _ = tokio::time::timeout(send_timeout, sink.send(close)).await;
        }
    }
    let _ = tokio::time::timeout(send_timeout, sink.close()).await;
    exit
}

async fn next_tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io;

    use futures::channel::mpsc as fmpsc;
    use waypoint_core::PayloadSchema;

    use super::*;

    fn broadcaster() -> Arc<Broadcaster> {
        Arc::new(Broadcaster::new(
            Arc::new(ConnectionRegistry::new()),
            PayloadSchema::Subject,
        ))
    }

    fn registered(
        b: &Broadcaster,
        capacity: usize,
    ) -> (Arc<SubscriberConnection>, mpsc::Receiver<Arc<str>>) {
        let (conn, rx) = SubscriberConnection::channel(capacity);
        assert!(b.registry().add(Arc::clone(&conn)));
        (conn, rx)
    }

    fn text(frame: &Message) -> &str {
        match frame {
            Message::Text(t) => t.as_str(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    // ── writer ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn writer_forwards_payloads_then_closes() {
        let b = broadcaster();
        let (conn, rx) = registered(&b, 8);
        let (sink, mut frames) = fmpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_loop(
            sink,
            rx,
            Arc::clone(&conn),
            Arc::clone(&b),
            Duration::from_secs(1),
            None,
        ));

        conn.offer(Arc::from("first")).unwrap();
        conn.offer(Arc::from("second")).unwrap();
        assert_eq!(text(&frames.next().await.unwrap()), "first");
        assert_eq!(text(&frames.next().await.unwrap()), "second");

        assert!(b.registry().remove(conn.id()));
        assert_eq!(writer.await.unwrap(), WriterExit::Closed);
        assert!(matches!(frames.next().await, Some(Message::Close(Some(_)))));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_write_times_out_and_evicts() {
        let b = broadcaster();
        let (conn, rx) = registered(&b, 8);
        // Zero-buffer channel that is never read stalls the writer.
        let (sink, _frames) = fmpsc::channel::<Message>(0);

        conn.offer(Arc::from("one")).unwrap();
        conn.offer(Arc::from("two")).unwrap();
        let exit = write_loop(
            sink,
            rx,
            Arc::clone(&conn),
            Arc::clone(&b),
            Duration::from_millis(50),
            None,
        )
        .await;

        assert_eq!(exit, WriterExit::Failed(DeliveryError::Timeout));
        assert!(conn.is_removed());
        assert!(!b.registry().contains(conn.id()));
    }

    #[tokio::test]
    async fn write_error_evicts() {
        let b = broadcaster();
        let (conn, rx) = registered(&b, 8);
        let (sink, frames) = fmpsc::unbounded::<Message>();
        drop(frames);

        conn.offer(Arc::from("lost")).unwrap();
        let exit = write_loop(
            sink,
            rx,
            Arc::clone(&conn),
            Arc::clone(&b),
            Duration::from_secs(1),
            None,
        )
        .await;

        assert_eq!(exit, WriterExit::Failed(DeliveryError::Closed));
        assert!(b.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_sends_pings() {
        let b = broadcaster();
        let (conn, rx) = registered(&b, 8);
        let (sink, mut frames) = fmpsc::unbounded::<Message>();
        let writer = tokio::spawn(write_loop(
            sink,
            rx,
            Arc::clone(&conn),
            Arc::clone(&b),
            Duration::from_secs(1),
            Some(Duration::from_secs(10)),
        ));

        assert!(matches!(frames.next().await, Some(Message::Ping(_))));
        assert!(matches!(frames.next().await, Some(Message::Ping(_))));

        let _ = b.registry().remove(conn.id());
        assert_eq!(writer.await.unwrap(), WriterExit::Closed);
    }

    // ── reader ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn reader_discards_data_until_close_frame() {
        let frames = futures::stream::iter(vec![
            Ok::<_, io::Error>(Message::Text("ignored".into())),
            Ok(Message::Binary(Bytes::from_static(b"ignored"))),
            Ok(Message::Close(None)),
            Ok(Message::Text("never read".into())),
        ]);
        let token = CancellationToken::new();
        let reason = read_loop(frames, &token, &CancellationToken::new()).await;
        assert_eq!(reason, Disconnect::PeerClosed);
    }

    #[tokio::test]
    async fn reader_reports_eof_and_errors() {
        let none = CancellationToken::new();
        let eof = futures::stream::iter(Vec::<Result<Message, io::Error>>::new());
        assert_eq!(read_loop(eof, &none, &none).await, Disconnect::Eof);

        let err = futures::stream::iter(vec![Err::<Message, _>(io::Error::other("reset"))]);
        assert_eq!(read_loop(err, &none, &none).await, Disconnect::ReadError);
    }

    #[tokio::test]
    async fn reader_stops_on_eviction_and_shutdown() {
        let close = CancellationToken::new();
        let shutdown = CancellationToken::new();
        close.cancel();
        let idle = futures::stream::pending::<Result<Message, io::Error>>();
        assert_eq!(read_loop(idle, &close, &shutdown).await, Disconnect::Evicted);

        let close = CancellationToken::new();
        shutdown.cancel();
        let idle = futures::stream::pending::<Result<Message, io::Error>>();
        assert_eq!(read_loop(idle, &close, &shutdown).await, Disconnect::Shutdown);
    }

    // ── full lifecycle ──────────────────────────────────────────────

    #[tokio::test]
    async fn serve_registers_and_deregisters() {
        let b = broadcaster();
        let shutdown = CancellationToken::new();
        let lifecycle = Arc::new(SubscriberLifecycle::new(
            Arc::clone(&b),
            &ServerConfig::default(),
            shutdown.clone(),
        ));

        let (sink, mut frames) = fmpsc::unbounded::<Message>();
        let (peer, inbound) = fmpsc::unbounded::<Result<Message, io::Error>>();
        let task = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.serve(sink, inbound).await })
        };

        while b.registry().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(b.publish_payload(Arc::from("hello")).delivered, 1);
        assert_eq!(text(&frames.next().await.unwrap()), "hello");

        peer.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(task.await.unwrap(), Disconnect::PeerClosed);
        assert!(b.registry().is_empty());
    }

    #[tokio::test]
    async fn shutdown_ends_all_connections() {
        let b = broadcaster();
        let shutdown = CancellationToken::new();
        let lifecycle = Arc::new(SubscriberLifecycle::new(
            Arc::clone(&b),
            &ServerConfig::default(),
            shutdown.clone(),
        ));

        let mut tasks = Vec::new();
        let mut peers = Vec::new();
        for _ in 0..3 {
            let (sink, frames) = fmpsc::unbounded::<Message>();
            let lifecycle = Arc::clone(&lifecycle);
            peers.push(frames);
            tasks.push(tokio::spawn(async move {
                lifecycle
                    .serve(sink, futures::stream::pending::<Result<Message, io::Error>>())
                    .await
            }));
        }
        while b.registry().len() < 3 {
            tokio::task::yield_now().await;
        }

        shutdown.cancel();
        for task in tasks {
            assert_eq!(task.await.unwrap(), Disconnect::Shutdown);
        }
        assert!(b.registry().is_empty());
        for mut frames in peers {
            assert!(matches!(frames.next().await, Some(Message::Close(Some(_)))));
        }
    }
}
