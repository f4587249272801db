//! Single-consumer dispatcher for domain events.
//!
//! [`EventSink::spawn`] starts one task that handles events strictly in arrival
//! order. Producers hand events over through an [`EventSender`]; a send only
//! completes once the consumer has taken the event, so a slow handler pushes
//! back on every producer instead of letting events pile up in a buffer.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use error_stack::Report;
use futures::FutureExt;
use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::events::DomainEvent;
use crate::domain::events::EventError;
use crate::domain::events::EventResult;
use crate::domain::events::SinkError;

/// How long the sink waits for room in a producer's result mailbox.
pub const SINK_DELIVERY_TIMEOUT: Duration = Duration::from_secs(3);

struct Envelope {
    event: DomainEvent,
    taken: oneshot::Sender<()>,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Send endpoint of an [`EventSink`].
///
/// Dropping every clone closes the sink's input and terminates it.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::Sender<Envelope>,
}

impl EventSender {
    /// Hand `event` to the consumer, waiting until it has been taken.
    ///
    /// Dropping the returned future after the event was queued does not
    /// withdraw it; the consumer may still handle it.
    ///
    /// # Errors
    ///
    /// - [`SinkError::Closed`] if the consumer has terminated
    pub async fn send(&self, event: impl Into<DomainEvent>) -> Result<(), Report<SinkError>> {
        let (taken, was_taken) = oneshot::channel();
        self.tx
            .send(Envelope {
                event: event.into(),
                taken,
            })
            .await
            .map_err(|_| Report::new(SinkError::Closed))?;
        // the envelope is dropped unread if the consumer exits first
        was_taken.await.map_err(|_| Report::new(SinkError::Closed))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Serialises domain event handling on a single background task.
pub struct EventSink {
    rx: mpsc::Receiver<Envelope>,
    token: CancellationToken,
}

impl EventSink {
    /// Start the consumer task.
    ///
    /// The task runs until every [`EventSender`] is dropped or `token` is
    /// cancelled. Once it has stopped, further sends fail with
    /// [`SinkError::Closed`].
    pub fn spawn(token: CancellationToken) -> (EventSender, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let sink = Self { rx, token };
        let handle = tokio::spawn(sink.run());
        (EventSender { tx }, handle)
    }

    #[tracing::instrument(name = "event_sink", skip(self))]
    async fn run(mut self) {
        info!("Event sink started");
        loop {
            select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("Event sink cancelled");
                    break;
                }
                envelope = self.rx.recv() => {
                    let Some(Envelope { event, taken }) = envelope else {
                        info!("Event sink input closed");
                        break;
                    };
                    // the producer may have given up waiting; that is fine
                    let _ = taken.send(());
                    dispatch(&self.token, event).await;
                }
            }
        }
        info!("Event sink terminated");
    }
}

async fn dispatch(token: &CancellationToken, mut event: DomainEvent) {
    let result_tx = event.take_result();
    let kind = event.kind();
    let host_id = event.identity().host_id.clone();
    debug!(kind, host_id = %host_id, "Handling event");

    let outcome = AssertUnwindSafe(event.handle(token))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(Report::new(EventError::HandlerPanicked {
                message: panic_message(panic.as_ref()),
            }))
        });

    if let Err(report) = &outcome {
        if report.current_context().is_validation() {
            warn!(kind, host_id = %host_id, "Rejected event: {report:?}");
        } else {
            error!(kind, host_id = %host_id, "Failed to handle event: {report:?}");
        }
    }

    if let Some(result_tx) = result_tx {
        deliver(token, result_tx, outcome, kind, &host_id).await;
    }
}

async fn deliver(
    token: &CancellationToken,
    result_tx: mpsc::Sender<EventResult>,
    outcome: EventResult,
    kind: &str,
    host_id: &str,
) {
    let sent = select! {
        biased;
        _ = token.cancelled() => {
            debug!(kind, host_id, "Event sink cancelled, dropping result");
            return;
        }
        sent = result_tx.send_timeout(outcome, SINK_DELIVERY_TIMEOUT) => sent,
    };
    match sent {
        Ok(()) => {}
        Err(SendTimeoutError::Timeout(_)) => {
            error!(
                kind,
                host_id,
                "Result not collected within {SINK_DELIVERY_TIMEOUT:?}, dropping it"
            );
        }
        Err(SendTimeoutError::Closed(_)) => {
            debug!(kind, host_id, "Result receiver gone, dropping result");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
