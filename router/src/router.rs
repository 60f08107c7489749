use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use doorbell_common::event::{Command, Decision, Event, Topic, UnlockReason};
use doorbell_common::frame::FrameBroker;
use doorbell_notify::{Broadcaster, Notification};
use tracing::{debug, error, info, warn};

use crate::bus::CommandSink;
use crate::error::ServiceError;
use crate::identify::Identifier;
use crate::secret::SecretStore;
use crate::worker::EventHandler;

#[derive(Debug, Clone, Copy)]
pub struct RouterTimeouts {
    pub identify: Duration,
    pub secret: Duration,
}

/// Turns doorbell events into door commands and notifications.
///
/// Holds no state between events. Unlock is only ever reached through a known
/// face or an exact password match; every failure path ends locked.
pub struct AccessEventRouter {
    broker: Arc<FrameBroker>,
    identifier: Arc<dyn Identifier>,
    secrets: Arc<dyn SecretStore>,
    commands: Arc<dyn CommandSink>,
    notifier: Arc<dyn Broadcaster>,
    timeouts: RouterTimeouts,
}

impl AccessEventRouter {
    pub fn new(
        broker: Arc<FrameBroker>,
        identifier: Arc<dyn Identifier>,
        secrets: Arc<dyn SecretStore>,
        commands: Arc<dyn CommandSink>,
        notifier: Arc<dyn Broadcaster>,
        timeouts: RouterTimeouts,
    ) -> Self {
        Self {
            broker,
            identifier,
            secrets,
            commands,
            notifier,
            timeouts,
        }
    }

    /// Process one event to completion. `None` means no access decision was
    /// taken (ring, or motion with nothing to look at).
    pub async fn route(&self, event: &Event) -> Option<Decision> {
        match event.topic {
            Topic::Motion => self.on_motion().await,
            Topic::PasswordAttempt => Some(self.on_password(&event.payload).await),
            Topic::Ring => {
                info!("doorbell ring");
                self.notifier.broadcast(&Notification::doorbell_ring()).await;
                None
            }
        }
    }

    async fn on_motion(&self) -> Option<Decision> {
        let Some(frame) = self.broker.latest() else {
            debug!("motion before the first camera frame, ignoring");
            return None;
        };

        info!(seq = frame.seq, "motion detected, identifying faces");
        let result = match with_timeout(
            "identification service",
            self.timeouts.identify,
            self.identifier.identify(frame.jpeg.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "identification failed, ignoring motion");
                return None;
            }
        };

        let decision = result.decision();
        match decision {
            Decision::Unlock => {
                let names = result.known_names();
                info!(?names, "known person at the door");
                let command = Command::Unlock(UnlockReason::FaceMatch {
                    names: names.clone(),
                });
                if self.send_unlock(&command).await {
                    self.notifier
                        .broadcast(&Notification::known_person(&names))
                        .await;
                }
            }
            Decision::NotifyUnknown => {
                info!(faces = result.labels.len(), "unknown person at the door");
                self.notifier
                    .broadcast(&Notification::unknown_person())
                    .await;
            }
            Decision::NotifyNoFace | Decision::Deny => {
                debug!(seq = frame.seq, "no face in frame");
            }
        }
        Some(decision)
    }

    async fn on_password(&self, attempt: &Bytes) -> Decision {
        let secret = match with_timeout(
            "secret store",
            self.timeouts.secret,
            self.secrets.current_password(),
        )
        .await
        {
            Ok(secret) => secret,
            Err(e) => {
                warn!(error = %e, "could not fetch door password, denying attempt");
                return Decision::Deny;
            }
        };

        if attempt.as_ref() != secret.as_bytes() {
            info!("incorrect password attempt");
            return Decision::Deny;
        }

        info!("password accepted, unlocking door");
        if self.send_unlock(&Command::Unlock(UnlockReason::Password)).await {
            self.notifier
                .broadcast(&Notification::password_unlock())
                .await;
        }
        Decision::Unlock
    }

    /// Returns whether the command reached the bus. On failure the door state
    /// is unknown, so no "unlocked" notification should follow.
    async fn send_unlock(&self, command: &Command) -> bool {
        match self.commands.send(command).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "failed to send unlock command");
                false
            }
        }
    }
}

#[async_trait]
impl EventHandler for AccessEventRouter {
    async fn handle(&self, event: &Event) -> Option<Decision> {
        self.route(event).await
    }
}

async fn with_timeout<T>(
    service: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(ServiceError::Timeout { service }))
}
