//! Transcript event fan-out for long-lived stream subscribers

mod publisher;

pub use publisher::{
    EventPublisher, StreamFrame, Subscription, DEFAULT_EVENT_BUFFER, DEFAULT_KEEPALIVE,
};
