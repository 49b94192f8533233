use std::sync::Arc;

use log::{error, info};
use mongodb::{Collection, Database};
use tokio::sync::mpsc;

use crate::models::booking::BookingEvent;

pub const EVENTS_COLLECTION: &str = "BookingEvents";

/// Receives lifecycle transitions. Delivery is fire-and-forget: publishers
/// must not block the caller and failures never reach the booking flow.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &BookingEvent);
}

pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: &BookingEvent) {
        info!(
            "booking {} ({}) {} -> {}",
            event.booking_code,
            event.booking_id,
            event
                .from_status
                .map(|s| s.as_str())
                .unwrap_or("new"),
            event.to_status
        );
    }
}

/// Hands events to an in-process consumer.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<BookingEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BookingEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: &BookingEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event.clone());
    }
}

/// Appends events to the `BookingEvents` collection in the background.
pub struct MongoEventPublisher {
    collection: Collection<BookingEvent>,
}

impl MongoEventPublisher {
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection(EVENTS_COLLECTION),
        }
    }
}

impl EventPublisher for MongoEventPublisher {
    fn publish(&self, event: &BookingEvent) {
        let collection = self.collection.clone();
        let event = event.clone();
        actix_web::rt::spawn(async move {
            if let Err(err) = collection.insert_one(&event).await {
                error!(
                    "Failed to record event {} for booking {}: {}",
                    event.event_id, event.booking_code, err
                );
            }
        });
    }
}

pub struct FanoutPublisher {
    sinks: Vec<Arc<dyn EventPublisher>>,
}

impl FanoutPublisher {
    pub fn new(sinks: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { sinks }
    }
}

impl EventPublisher for FanoutPublisher {
    fn publish(&self, event: &BookingEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}
