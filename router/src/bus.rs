use std::time::Duration;

use async_trait::async_trait;
use doorbell_common::config::MqttConfig;
use doorbell_common::event::{Command, Event, Topic};
use rumqttc::{AsyncClient, Event as MqttEvent, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};

use crate::worker::{EnqueueError, TopicQueues};

/// Where door commands go.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: &Command) -> Result<(), BusError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },
}

/// Topic names on the broker.
#[derive(Debug, Clone)]
pub struct BusTopics {
    pub motion: String,
    pub password: String,
    pub ring: String,
    pub unlock: String,
    pub lock: String,
}

impl BusTopics {
    pub fn from_config(config: &MqttConfig) -> Self {
        Self {
            motion: config.motion_topic.clone(),
            password: config.password_topic.clone(),
            ring: config.ring_topic.clone(),
            unlock: config.unlock_topic.clone(),
            lock: config.lock_topic.clone(),
        }
    }

    pub fn inbound(&self, topic: Topic) -> &str {
        match topic {
            Topic::Motion => &self.motion,
            Topic::PasswordAttempt => &self.password,
            Topic::Ring => &self.ring,
        }
    }

    pub fn classify(&self, name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| self.inbound(*t) == name)
    }

    pub fn outbound(&self, command: &Command) -> &str {
        match command {
            Command::Unlock(_) => &self.unlock,
            Command::Lock => &self.lock,
        }
    }
}

/// MQTT connection to the door controller.
pub struct MqttBus {
    client: AsyncClient,
    topics: BusTopics,
}

impl MqttBus {
    /// Create the client. Nothing is sent until the returned event loop is polled.
    pub fn connect(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 10);
        info!(
            broker = %format!("{}:{}", config.host, config.port),
            client_id = %config.client_id,
            "MQTT client created"
        );

        (
            Self {
                client,
                topics: BusTopics::from_config(config),
            },
            eventloop,
        )
    }

    /// Drive the MQTT connection and hand inbound events to the topic queues.
    ///
    /// Subscriptions are renewed on every ConnAck because the session is clean.
    /// Handing off never waits, so a backed-up topic cannot stall polling.
    pub async fn run(&self, mut eventloop: EventLoop, queues: TopicQueues) {
        loop {
            match eventloop.poll().await {
                Ok(MqttEvent::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    for topic in Topic::ALL {
                        let name = self.topics.inbound(topic);
                        // try_ variant: the request queue is drained by this same loop.
                        if let Err(e) = self.client.try_subscribe(name, QoS::AtLeastOnce) {
                            error!(error = %e, topic = name, "failed to subscribe");
                        }
                    }
                }
                Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                    let Some(topic) = self.topics.classify(&publish.topic) else {
                        debug!(topic = %publish.topic, "ignoring message on unknown topic");
                        continue;
                    };
                    match queues.enqueue(Event::new(topic, publish.payload)) {
                        Ok(()) => debug!(%topic, "event queued"),
                        Err(EnqueueError::Full(topic)) => {
                            warn!(%topic, "event queue full, dropping event")
                        }
                        Err(EnqueueError::Closed(topic)) => {
                            error!(%topic, "event worker stopped, dropping event")
                        }
                    }
                }
                Ok(MqttEvent::Incoming(packet)) => {
                    debug!(?packet, "received MQTT packet");
                }
                Ok(MqttEvent::Outgoing(_)) => {}
                Err(e) => {
                    error!(error = %e, "MQTT connection error");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

#[async_trait]
impl CommandSink for MqttBus {
    async fn send(&self, command: &Command) -> Result<(), BusError> {
        let topic = self.topics.outbound(command);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, command.payload())
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;
        info!(topic, ?command, "command published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorbell_common::event::UnlockReason;

    #[test]
    fn topics_classify_by_configured_name() {
        let topics = BusTopics::from_config(&MqttConfig {
            motion_topic: "porch/motion".into(),
            ..MqttConfig::default()
        });
        assert_eq!(topics.classify("porch/motion"), Some(Topic::Motion));
        assert_eq!(topics.classify("doorbell/password"), Some(Topic::PasswordAttempt));
        assert_eq!(topics.classify("doorbell/ring"), Some(Topic::Ring));
        assert_eq!(topics.classify("doorbell/motion"), None);
        assert_eq!(topics.classify("doorbell/unlock"), None);
    }

    #[test]
    fn commands_map_to_outbound_topics() {
        let topics = BusTopics::from_config(&MqttConfig::default());
        assert_eq!(
            topics.outbound(&Command::Unlock(UnlockReason::Password)),
            "doorbell/unlock"
        );
        assert_eq!(topics.outbound(&Command::Lock), "doorbell/lock");
    }
}
