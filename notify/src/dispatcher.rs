use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::message::Notification;
use crate::registry::{short, SubscriberRegistry};
use crate::transport::{DeliveryError, PushTransport};

/// Per-broadcast tally.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Tokens dropped from the registry after a permanent failure.
    pub removed: usize,
    /// Transient failures; the tokens stay registered.
    pub failed: usize,
}

/// Anything that can fan a notification out to subscribers.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, notification: &Notification) -> BroadcastReport;
}

enum Outcome {
    Delivered,
    Removed,
    Failed,
}

/// Fans notifications out to every registered subscriber.
///
/// Deliveries run concurrently and independently: a slow or failing token
/// never holds up or affects another. Nothing is retried; the next event
/// naturally retries tokens that failed transiently.
pub struct NotificationDispatcher {
    registry: Arc<SubscriberRegistry>,
    transport: Arc<dyn PushTransport>,
    delivery_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        transport: Arc<dyn PushTransport>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            delivery_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub async fn broadcast(&self, notification: &Notification) -> BroadcastReport {
        let tokens = self.registry.snapshot();
        if tokens.is_empty() {
            info!(title = %notification.title, "no subscribers registered");
            return BroadcastReport::default();
        }

        let outcomes = join_all(tokens.iter().map(|token| self.deliver(token, notification))).await;

        let mut report = BroadcastReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered += 1,
                Outcome::Removed => report.removed += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        info!(
            title = notification.title,
            delivered = report.delivered,
            removed = report.removed,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    /// Deliver to one token with the same failure handling as `broadcast`.
    pub async fn send_to(&self, token: &str, notification: &Notification) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        match self.deliver(token, notification).await {
            Outcome::Delivered => report.delivered = 1,
            Outcome::Removed => report.removed = 1,
            Outcome::Failed => report.failed = 1,
        }
        report
    }

    async fn deliver(&self, token: &str, notification: &Notification) -> Outcome {
        let result =
            match tokio::time::timeout(self.delivery_timeout, self.transport.send(token, notification))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout),
            };

        match result {
            Ok(message_id) => {
                debug!(token = short(token), message_id = %message_id, "notification delivered");
                Outcome::Delivered
            }
            Err(e) if e.is_permanent() => {
                warn!(token = short(token), error = %e, "dropping invalid subscriber token");
                self.registry.remove(token);
                Outcome::Removed
            }
            Err(e) => {
                warn!(token = short(token), error = %e, "notification delivery failed");
                Outcome::Failed
            }
        }
    }
}

#[async_trait]
impl Broadcaster for NotificationDispatcher {
    async fn broadcast(&self, notification: &Notification) -> BroadcastReport {
        NotificationDispatcher::broadcast(self, notification).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Behavior {
        Ok,
        Invalid,
        Transient,
        Hang,
    }

    #[derive(Default)]
    struct FakeTransport {
        behaviors: HashMap<String, Behavior>,
        sent: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn with(mut self, token: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(token.to_string(), behavior);
            self
        }
    }

    #[async_trait]
    impl PushTransport for FakeTransport {
        async fn send(&self, token: &str, _n: &Notification) -> Result<String, DeliveryError> {
            match self.behaviors.get(token).unwrap_or(&Behavior::Ok) {
                Behavior::Ok => {
                    self.sent.lock().unwrap().push(token.to_string());
                    Ok(format!("msg-{token}"))
                }
                Behavior::Invalid => Err(DeliveryError::InvalidToken("unregistered".into())),
                Behavior::Transient => Err(DeliveryError::Unreachable("connection refused".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("late".into())
                }
            }
        }
    }

    fn setup(transport: FakeTransport, tokens: &[&str]) -> (NotificationDispatcher, Arc<FakeTransport>) {
        let registry = Arc::new(SubscriberRegistry::new());
        for t in tokens {
            registry.register(t);
        }
        let transport = Arc::new(transport);
        let dispatcher = NotificationDispatcher::new(
            registry,
            Arc::clone(&transport) as Arc<dyn PushTransport>,
            Duration::from_millis(200),
        );
        (dispatcher, transport)
    }

    #[tokio::test]
    async fn permanent_failure_removes_only_that_token() {
        let transport = FakeTransport::default().with("t3", Behavior::Invalid);
        let (dispatcher, transport) = setup(transport, &["t1", "t2", "t3", "t4", "t5"]);

        let report = dispatcher.broadcast(&Notification::doorbell_ring()).await;

        assert_eq!(report, BroadcastReport { delivered: 4, removed: 1, failed: 0 });
        let mut remaining = dispatcher.registry().snapshot();
        remaining.sort();
        assert_eq!(remaining, vec!["t1", "t2", "t4", "t5"]);
        assert_eq!(transport.sent.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn transient_failure_keeps_token() {
        let transport = FakeTransport::default().with("t1", Behavior::Transient);
        let (dispatcher, _) = setup(transport, &["t1", "t2"]);

        let report = dispatcher.broadcast(&Notification::unknown_person()).await;

        assert_eq!(report, BroadcastReport { delivered: 1, removed: 0, failed: 1 });
        assert!(dispatcher.registry().contains("t1"));
    }

    #[tokio::test]
    async fn hung_delivery_times_out_without_blocking_others() {
        let transport = FakeTransport::default().with("slow", Behavior::Hang);
        let (dispatcher, transport) = setup(transport, &["slow", "fast"]);

        let report = tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.broadcast(&Notification::doorbell_ring()),
        )
        .await
        .expect("broadcast must not wait on the hung token");

        assert_eq!(report, BroadcastReport { delivered: 1, removed: 0, failed: 1 });
        assert!(dispatcher.registry().contains("slow"));
        assert_eq!(*transport.sent.lock().unwrap(), vec!["fast"]);
    }

    #[tokio::test]
    async fn empty_registry_sends_nothing() {
        let (dispatcher, transport) = setup(FakeTransport::default(), &[]);
        let report = dispatcher.broadcast(&Notification::doorbell_ring()).await;
        assert_eq!(report, BroadcastReport::default());
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_to_drops_invalid_token() {
        let transport = FakeTransport::default().with("bad", Behavior::Invalid);
        let (dispatcher, _) = setup(transport, &["bad"]);
        let report = dispatcher.send_to("bad", &Notification::welcome()).await;
        assert_eq!(report.removed, 1);
        assert!(dispatcher.registry().is_empty());
    }
}
