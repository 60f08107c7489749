use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use doorbell_common::event::{Decision, Event, Topic};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Processes one event to completion.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &Event) -> Option<Decision>;
}

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("queue for {0} is full")]
    Full(Topic),
    #[error("worker for {0} has stopped")]
    Closed(Topic),
}

/// One bounded queue and one worker per topic.
///
/// Events on a topic are handled strictly in arrival order; a slow topic
/// (motion waiting on identification) never holds up the others. Admission
/// never waits: an event that finds its queue full is rejected at once.
#[derive(Clone)]
pub struct TopicQueues {
    senders: HashMap<Topic, mpsc::Sender<Event>>,
}

impl TopicQueues {
    pub fn spawn<H: EventHandler>(handler: Arc<H>, capacity: usize) -> (Self, Vec<JoinHandle<()>>) {
        let mut senders = HashMap::new();
        let mut workers = Vec::with_capacity(Topic::ALL.len());

        for topic in Topic::ALL {
            let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
            let handler = Arc::clone(&handler);
            workers.push(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    let decision = handler.handle(&event).await;
                    debug!(%topic, ?decision, "event handled");
                }
                info!(%topic, "event worker stopped");
            }));
            senders.insert(topic, tx);
        }

        (Self { senders }, workers)
    }

    /// Queue an event without waiting.
    pub fn enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        let topic = event.topic;
        let Some(tx) = self.senders.get(&topic) else {
            return Err(EnqueueError::Closed(topic));
        };
        tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full(topic),
            TrySendError::Closed(_) => EnqueueError::Closed(topic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Topic, Bytes)>>,
        gate: Notify,
        block_motion: bool,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &Event) -> Option<Decision> {
            if self.block_motion && event.topic == Topic::Motion {
                self.gate.notified().await;
            }
            self.seen
                .lock()
                .unwrap()
                .push((event.topic, event.payload.clone()));
            None
        }
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("handler saw fewer than {count} events");
    }

    fn blocking_motion() -> Arc<Recorder> {
        Arc::new(Recorder {
            block_motion: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn events_on_a_topic_keep_arrival_order() {
        let recorder = Arc::new(Recorder::default());
        let (queues, _workers) = TopicQueues::spawn(Arc::clone(&recorder), 8);

        for i in 0..5u8 {
            queues
                .enqueue(Event::new(Topic::PasswordAttempt, vec![i]))
                .unwrap();
        }
        wait_for(&recorder, 5).await;

        let payloads: Vec<u8> = recorder
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(_, p)| p[0])
            .collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn slow_topic_does_not_block_others() {
        let recorder = blocking_motion();
        let (queues, _workers) = TopicQueues::spawn(Arc::clone(&recorder), 4);

        queues.enqueue(Event::new(Topic::Motion, Bytes::new())).unwrap();
        queues.enqueue(Event::new(Topic::Ring, Bytes::new())).unwrap();

        wait_for(&recorder, 1).await;
        assert_eq!(recorder.seen.lock().unwrap()[0].0, Topic::Ring);

        recorder.gate.notify_one();
        wait_for(&recorder, 2).await;
        assert_eq!(recorder.seen.lock().unwrap()[1].0, Topic::Motion);
    }

    #[tokio::test]
    async fn full_queue_rejects_at_once_and_other_topics_still_admit() {
        let recorder = blocking_motion();
        let (queues, _workers) = TopicQueues::spawn(Arc::clone(&recorder), 1);

        // First is taken by the blocked worker, second fills the queue.
        queues.enqueue(Event::new(Topic::Motion, Bytes::new())).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        queues.enqueue(Event::new(Topic::Motion, Bytes::new())).unwrap();

        let started = Instant::now();
        for _ in 0..10 {
            let err = queues
                .enqueue(Event::new(Topic::Motion, Bytes::new()))
                .unwrap_err();
            assert!(matches!(err, EnqueueError::Full(Topic::Motion)));
        }
        queues.enqueue(Event::new(Topic::Ring, Bytes::new())).unwrap();
        queues
            .enqueue(Event::new(Topic::PasswordAttempt, Bytes::from_static(b"pw")))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(50));

        wait_for(&recorder, 2).await;
        let topics: Vec<Topic> = recorder.seen.lock().unwrap().iter().map(|(t, _)| *t).collect();
        assert!(topics.contains(&Topic::Ring));
        assert!(topics.contains(&Topic::PasswordAttempt));
    }
}
