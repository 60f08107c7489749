//! Push notifications: who to notify, and fan-out to each of them.

pub mod dispatcher;
pub mod message;
pub mod registry;
pub mod transport;

pub use dispatcher::{BroadcastReport, Broadcaster, NotificationDispatcher};
pub use message::Notification;
pub use registry::SubscriberRegistry;
pub use transport::{DeliveryError, FcmTransport, PushTransport};
