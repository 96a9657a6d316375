// mct-camera/src/stream.rs
use crate::SharedQueue;
use futures_core::Stream;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

// back‑pressure: queue → channel → consumer
const DEPTH: usize = 4;
// how often the helper re-checks for a dropped stream
const POLL: Duration = Duration::from_millis(20);

/// Async view of a blocking queue.
///
/// A helper thread pops from `queue` and forwards into a bounded channel.
/// The stream ends once the queue is stopped and drained. Channel space
/// is reserved before anything is popped, so after the stream is dropped
/// the helper leaves every remaining item to the other consumers and
/// exits within one poll interval.
pub fn frame_stream<T>(queue: SharedQueue<T>) -> impl Stream<Item = T>
where
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEPTH);

    std::thread::spawn(move || loop {
        let permit = match tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                std::thread::sleep(POLL);
                continue;
            }
            Err(TrySendError::Closed(())) => break, // consumer dropped
        };
        match queue.pop_timeout(POLL) {
            Some(item) if tx.is_closed() => {
                queue.requeue(item);
                break;
            }
            Some(item) => permit.send(item),
            None if queue.is_stopped() && queue.is_empty() => break,
            None => {}
        }
    });

    ReceiverStream::new(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BlockingQueue;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn stream_yields_in_order_then_ends() {
        let q = BlockingQueue::shared();
        for i in 0..10u32 {
            q.push(i);
        }
        q.stop();
        let got: Vec<u32> = frame_stream(q).collect().await;
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stream_waits_for_late_items() {
        let q = BlockingQueue::shared();
        let mut s = Box::pin(frame_stream(q.clone()));

        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            q.push("late");
            q.stop();
        });

        assert_eq!(s.next().await, Some("late"));
        assert_eq!(s.next().await, None);
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn dropped_stream_leaves_items_for_other_consumers() {
        let q = BlockingQueue::shared();
        let mut s = Box::pin(frame_stream(q.clone()));
        q.push(1);
        assert_eq!(s.next().await, Some(1));
        drop(s);

        let other = {
            let q = q.clone();
            std::thread::spawn(move || q.pop())
        };
        q.push(2);
        assert_eq!(other.join().unwrap(), Some(2));

        q.stop();
        assert_eq!(q.iter().count(), 0);
    }
}
