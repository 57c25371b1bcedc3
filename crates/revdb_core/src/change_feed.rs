//! Change feed for observing accepted writes.
//!
//! Every accepted write row produces exactly one [`ChangeEvent`]. Events are
//! published to each subscriber's bounded queue and kept in a bounded history
//! for cursor polling.
//!
//! Queues drop their oldest event when full, so a slow subscriber never
//! blocks a writer. The number of events a subscriber lost is reported by
//! [`ChangeStream::dropped`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let stream = instance.subscribe()?;
//! std::thread::spawn(move || {
//!     while let Some(event) = stream.recv() {
//!         println!("{:?} {}", event.operation, event.id);
//!     }
//! });
//! ```

use crate::document::Document;
use crate::types::SequenceNumber;
use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Kind of an accepted write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    /// No previous state existed.
    Insert,
    /// A previous state existed and the new state is not deleted.
    Update,
    /// The new state is deleted.
    Delete,
}

impl ChangeOperation {
    /// Classifies a transition.
    pub fn classify(previous: Option<&Document>, current: &Document) -> Self {
        match previous {
            None => Self::Insert,
            Some(_) if current.is_deleted() => Self::Delete,
            Some(_) => Self::Update,
        }
    }
}

/// One accepted write.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Acceptance order within the instance.
    pub sequence: SequenceNumber,
    /// Kind of write.
    pub operation: ChangeOperation,
    /// Primary key.
    pub id: String,
    /// State before the write.
    pub previous: Option<Arc<Document>>,
    /// State after the write.
    pub current: Arc<Document>,
}

struct Queue {
    events: VecDeque<ChangeEvent>,
    dropped: u64,
    closed: bool,
}

struct Subscriber {
    queue: Mutex<Queue>,
    ready: Condvar,
    capacity: usize,
}

impl Subscriber {
    fn push(&self, event: ChangeEvent) {
        let mut queue = self.queue.lock();
        if queue.events.len() >= self.capacity {
            queue.events.pop_front();
            queue.dropped += 1;
        }
        queue.events.push_back(event);
        drop(queue);
        self.ready.notify_one();
    }

    fn close(&self) {
        self.queue.lock().closed = true;
        self.ready.notify_all();
    }
}

/// Receiving end of a subscription.
///
/// Dropping the stream unsubscribes it on the next publish.
pub struct ChangeStream {
    subscriber: Arc<Subscriber>,
}

impl ChangeStream {
    /// Blocks until an event arrives. Returns `None` once the feed is closed
    /// and the queue drained.
    pub fn recv(&self) -> Option<ChangeEvent> {
        let mut queue = self.subscriber.queue.lock();
        loop {
            if let Some(event) = queue.events.pop_front() {
                return Some(event);
            }
            if queue.closed {
                return None;
            }
            self.subscriber.ready.wait(&mut queue);
        }
    }

    /// Like [`recv`](Self::recv) but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ChangeEvent> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.subscriber.queue.lock();
        loop {
            if let Some(event) = queue.events.pop_front() {
                return Some(event);
            }
            if queue.closed {
                return None;
            }
            if self
                .subscriber
                .ready
                .wait_until(&mut queue, deadline)
                .timed_out()
            {
                return queue.events.pop_front();
            }
        }
    }

    /// Returns a queued event without blocking.
    pub fn try_recv(&self) -> Option<ChangeEvent> {
        self.subscriber.queue.lock().events.pop_front()
    }

    /// Drains every queued event without blocking.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.subscriber.queue.lock().events.drain(..).collect()
    }

    /// Number of events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.subscriber.queue.lock().dropped
    }

    /// Returns true once the feed has been closed.
    pub fn is_closed(&self) -> bool {
        self.subscriber.queue.lock().closed
    }
}

/// Distributes change events to subscribers.
///
/// Sequence numbers are assigned under one lock together with delivery, so
/// history and every queue see events in sequence order.
pub struct ChangeFeed {
    sequence: Mutex<SequenceNumber>,
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    history: RwLock<VecDeque<ChangeEvent>>,
    max_history: usize,
    capacity: usize,
    closed: RwLock<bool>,
}

impl ChangeFeed {
    /// Creates a feed with the given per-subscriber capacity and history size.
    pub fn new(capacity: usize, max_history: usize) -> Self {
        Self {
            sequence: Mutex::new(SequenceNumber::default()),
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            capacity: capacity.max(1),
            closed: RwLock::new(false),
        }
    }

    /// Subscribes to future events.
    ///
    /// Subscribing to a closed feed yields a stream that is already ended.
    pub fn subscribe(&self) -> ChangeStream {
        // Held across registration so close() cannot slip in between.
        let closed = self.closed.read();
        let subscriber = Arc::new(Subscriber {
            queue: Mutex::new(Queue {
                events: VecDeque::new(),
                dropped: 0,
                closed: *closed,
            }),
            ready: Condvar::new(),
            capacity: self.capacity,
        });
        if !*closed {
            self.subscribers.write().push(Arc::clone(&subscriber));
        }
        ChangeStream { subscriber }
    }

    /// Keeps the feed open while the guard is held; `None` once closed.
    ///
    /// A writer holds this from its open check until it has published, so
    /// [`close`](Self::close) waits for in-flight writes and every event
    /// published before close reaches the streams.
    pub fn hold_open(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let closed = self.closed.read();
        (!*closed).then_some(closed)
    }

    /// Assigns the next sequence number to a transition and publishes it.
    pub fn publish(
        &self,
        previous: Option<Arc<Document>>,
        current: Arc<Document>,
    ) -> ChangeEvent {
        let mut sequence = self.sequence.lock();
        *sequence = sequence.next();
        let event = ChangeEvent {
            sequence: *sequence,
            operation: ChangeOperation::classify(previous.as_deref(), &current),
            id: current.id().to_string(),
            previous,
            current,
        };
        self.emit(event.clone());
        event
    }

    fn emit(&self, event: ChangeEvent) {
        if self.max_history > 0 {
            let mut history = self.history.write();
            if history.len() >= self.max_history {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let mut subscribers = self.subscribers.write();
        // A stream whose only owner is the feed has been dropped.
        subscribers.retain(|s| Arc::strong_count(s) > 1);
        for subscriber in subscribers.iter() {
            subscriber.push(event.clone());
        }
    }

    /// Returns events with a sequence greater than `cursor`, up to `limit`.
    pub fn poll(&self, cursor: SequenceNumber, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence of the newest published event.
    pub fn latest_sequence(&self) -> SequenceNumber {
        *self.sequence.lock()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|s| Arc::strong_count(s) > 1)
            .count()
    }

    /// Number of retained events.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Ends every stream. Queued events stay readable.
    pub fn close(&self) {
        let mut closed = self.closed.write();
        *closed = true;
        for subscriber in self.subscribers.write().drain(..) {
            subscriber.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revdb_codec::Value;
    use std::thread;

    fn doc(id: &str) -> Arc<Document> {
        Arc::new(Document::create(id, [("n", Value::Integer(1))]).unwrap())
    }

    fn publish_n(feed: &ChangeFeed, n: u64) {
        for i in 1..=n {
            feed.publish(None, doc(&format!("k{i}")));
        }
    }

    #[test]
    fn publish_and_receive() {
        let feed = ChangeFeed::new(16, 16);
        let stream = feed.subscribe();

        let published = feed.publish(None, doc("a"));
        assert_eq!(published.sequence, SequenceNumber::new(1));
        assert_eq!(published.operation, ChangeOperation::Insert);

        let received = stream.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received, published);
    }

    #[test]
    fn multiple_subscribers() {
        let feed = ChangeFeed::new(16, 16);
        let s1 = feed.subscribe();
        let s2 = feed.subscribe();

        feed.publish(None, doc("a"));

        assert_eq!(s1.try_recv().unwrap().id, "a");
        assert_eq!(s2.try_recv().unwrap().id, "a");
    }

    #[test]
    fn subscriber_cleanup() {
        let feed = ChangeFeed::new(16, 16);
        let stream = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(stream);
        feed.publish(None, doc("a"));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let feed = ChangeFeed::new(3, 0);
        let stream = feed.subscribe();

        publish_n(&feed, 5);

        assert_eq!(stream.dropped(), 2);
        let sequences: Vec<u64> = stream.drain().iter().map(|e| e.sequence.as_u64()).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
    }

    #[test]
    fn poll_from_cursor() {
        let feed = ChangeFeed::new(16, 16);
        publish_n(&feed, 5);

        let events = feed.poll(SequenceNumber::new(2), 10);
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence.as_u64()).collect();
        assert_eq!(sequences, vec![3, 4, 5]);
        assert_eq!(feed.poll(SequenceNumber::new(0), 2).len(), 2);
    }

    #[test]
    fn history_truncation() {
        let feed = ChangeFeed::new(16, 5);
        publish_n(&feed, 10);

        assert_eq!(feed.history_len(), 5);
        assert_eq!(feed.poll(SequenceNumber::new(0), 100)[0].sequence.as_u64(), 6);
        assert_eq!(feed.latest_sequence().as_u64(), 10);
    }

    #[test]
    fn close_ends_streams_after_drain() {
        let feed = ChangeFeed::new(16, 16);
        let stream = feed.subscribe();
        feed.publish(None, doc("a"));
        feed.close();

        assert!(stream.recv().is_some());
        assert!(stream.recv().is_none());
        assert!(feed.subscribe().is_closed());
    }

    #[test]
    fn concurrent_publishers_keep_sequence_order() {
        let feed = Arc::new(ChangeFeed::new(1000, 1000));
        let stream = feed.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let feed = Arc::clone(&feed);
                thread::spawn(move || {
                    for i in 0..50 {
                        feed.publish(None, doc(&format!("t{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = stream.drain().iter().map(|e| e.sequence.as_u64()).collect();
        assert_eq!(sequences, (1..=200).collect::<Vec<u64>>());
    }

    #[test]
    fn threaded_subscribe() {
        let feed = Arc::new(ChangeFeed::new(16, 16));
        let stream = feed.subscribe();

        let feed_clone = Arc::clone(&feed);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            feed_clone.publish(None, doc("late"));
        });

        let received = stream.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.id, "late");

        handle.join().unwrap();
    }

    #[test]
    fn classify_operations() {
        let v1 = Document::create("a", [("n", Value::Integer(1))]).unwrap();
        let v2 = v1.with_field("n", 2).unwrap();
        let v3 = v2.next_deleted().unwrap();
        assert_eq!(ChangeOperation::classify(None, &v1), ChangeOperation::Insert);
        assert_eq!(ChangeOperation::classify(Some(&v1), &v2), ChangeOperation::Update);
        assert_eq!(ChangeOperation::classify(Some(&v2), &v3), ChangeOperation::Delete);
    }
}
