use tokio::sync::broadcast;

/// Fan-out of discrete notifications to any number of observers.
///
/// Publishing never blocks; slow subscribers observe `Lagged` instead of
/// back-pressuring the publisher.
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl<T: Clone> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
