//! Payment outcomes arriving from outside the engine.

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentwise_core::OrderId;
use rentwise_events::{EventBus, Subscription};
use rentwise_rentals::OrderEvent;

/// A payment provider's verdict on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Succeeded {
        order_id: OrderId,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        order_id: OrderId,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl PaymentEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            PaymentEvent::Succeeded { order_id, .. } | PaymentEvent::Failed { order_id, .. } => {
                *order_id
            }
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::Succeeded { occurred_at, .. }
            | PaymentEvent::Failed { occurred_at, .. } => *occurred_at,
        }
    }

    pub fn order_event(&self) -> OrderEvent {
        match self {
            PaymentEvent::Succeeded { .. } => OrderEvent::PaymentSucceeded,
            PaymentEvent::Failed { .. } => OrderEvent::PaymentFailed,
        }
    }
}

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Feeds payment outcomes from a bus into order transitions.
///
/// Delivery is at-least-once, so the handler must be idempotent.
#[derive(Debug)]
pub struct PaymentEventWorker;

impl PaymentEventWorker {
    pub fn spawn<B, H, E>(bus: B, tick: Duration, mut handler: H) -> io::Result<WorkerHandle>
    where
        B: EventBus<PaymentEvent> + Send + Sync + 'static,
        H: FnMut(PaymentEvent) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<PaymentEvent> = bus.subscribe();

        let join = thread::Builder::new()
            .name("payment-events".to_string())
            .spawn(move || worker_loop(sub, shutdown_rx, tick, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<H, E>(
    sub: Subscription<PaymentEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    tick: Duration,
    handler: &mut H,
) where
    H: FnMut(PaymentEvent) -> Result<(), E>,
    E: core::fmt::Display,
{
    tracing::info!("payment event worker started");

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => {
                let order_id = event.order_id();
                if let Err(err) = handler(event) {
                    tracing::warn!(order_id = %order_id, error = %err, "payment event not applied");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::info!("payment event worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentwise_events::InMemoryEventBus;
    use std::sync::{Arc, Mutex};

    #[test]
    fn worker_delivers_events_until_shutdown() {
        let bus = Arc::new(InMemoryEventBus::<PaymentEvent>::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = mpsc::channel();

        let sink = Arc::clone(&seen);
        let tick = Duration::from_millis(5);
        let handle = PaymentEventWorker::spawn(Arc::clone(&bus), tick, move |event| {
            sink.lock().unwrap().push(event.order_id());
            let _ = done_tx.send(());
            Ok::<(), String>(())
        })
        .unwrap();

        let order_id = OrderId::new();
        bus.publish(PaymentEvent::Succeeded {
            order_id,
            occurred_at: Utc::now(),
        })
        .unwrap();

        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![order_id]);
    }

    #[test]
    fn payment_events_are_tagged_by_outcome() {
        let json = serde_json::to_value(PaymentEvent::Succeeded {
            order_id: OrderId::new(),
            occurred_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "succeeded");
    }

    #[test]
    fn payment_events_map_to_order_events() {
        let failed = PaymentEvent::Failed {
            order_id: OrderId::new(),
            reason: "card declined".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(failed.order_event(), OrderEvent::PaymentFailed);
    }
}
