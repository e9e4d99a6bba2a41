use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

use crate::errors::ServiceError;
use crate::services::stock::{StockAdjuster, StockLine};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both ends.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Queues an event without waiting. A full queue drops the event.
    pub fn try_send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender.try_send(event).map_err(|e| {
            counter!("events_dropped_total", 1, "kind" => event_kind(&e.into_inner()));
            ServiceError::EventError("Event queue is full or closed".to_string())
        })
    }

    /// Queues an event that must not be lost without making the caller wait.
    /// When the queue is full, a spawned task waits for capacity instead.
    pub fn send_detached(&self, event: Event) -> Result<(), ServiceError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                counter!("events_backlogged_total", 1, "kind" => event_kind(&event));
                let sender = self.sender.clone();
                tokio::spawn(async move {
                    if let Err(e) = sender.send(event).await {
                        error!(error = %e, "Backlogged event lost, processor has stopped");
                    }
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(ServiceError::EventError(
                "Event processor has stopped".to_string(),
            )),
        }
    }
}

fn event_kind(event: &Event) -> &'static str {
    match event {
        Event::OrderCreated { .. } => "order_created",
        Event::StockAdjustmentRequested { .. } => "stock_adjustment_requested",
    }
}

// Events published after an order becomes durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: i64,
        total_quantity: i32,
        line_count: usize,
    },
    /// Stock decrement handed off to the background processor.
    StockAdjustmentRequested {
        order_id: i64,
        lines: Vec<StockLine>,
    },
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, adjuster: StockAdjuster) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                total_quantity,
                line_count,
            } => {
                info!(order_id, total_quantity, line_count, "Order created");
            }
            Event::StockAdjustmentRequested { order_id, lines } => {
                let report = adjuster.apply(order_id, &lines).await;
                if report.failed() > 0 {
                    error!(
                        order_id,
                        failed = report.failed(),
                        "Deferred stock adjustment left lines unadjusted"
                    );
                }
            }
        }
    }

    warn!("Event processing loop has ended");
}
