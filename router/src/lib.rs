//! Access-event routing: MQTT doorbell events in, door commands and push
//! notifications out.

pub mod bus;
pub mod error;
pub mod identify;
pub mod router;
pub mod secret;
pub mod worker;

pub use bus::{BusError, BusTopics, CommandSink, MqttBus};
pub use error::ServiceError;
pub use identify::{HttpIdentifier, Identifier, TrainingSummary};
pub use router::{AccessEventRouter, RouterTimeouts};
pub use secret::{RealtimeDbSecretStore, SecretStore};
pub use worker::{EnqueueError, EventHandler, TopicQueues};
