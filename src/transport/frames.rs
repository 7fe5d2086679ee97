//! Pull-based frame queue in front of the raw channel.
//!
//! The raw channel only supports one receive registration and drops every
//! frame after the first when several arrive in one notification. The queue
//! installs one persistent listener for its whole lifetime and fans deliveries
//! into a FIFO buffer plus a waiter list, so "frames received" and "frames
//! consumed" are decoupled.

use super::{ChannelDelivery, RawChannel, RawFrame};
use crate::error::TransportError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type Waiter = oneshot::Sender<Result<RawFrame, TransportError>>;

#[derive(Default)]
struct QueueState {
    /// Frames received but not yet handed to a consumer.
    buffered: VecDeque<RawFrame>,
    /// Consumers parked in `next()`. Non-empty only while `buffered` is empty.
    waiters: VecDeque<Waiter>,
    /// Set once the channel closes or fails; sticky.
    fault: Option<TransportError>,
    /// Frame already consumed through a stale registration, skipped once.
    stale_duplicate: Option<RawFrame>,
    /// Frames accepted since attach.
    accepted: u64,
}

/// FIFO frame buffer fed by the single channel listener.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct FrameQueue {
    state: Arc<Mutex<QueueState>>,
}

impl FrameQueue {
    /// Create a detached queue. Frames arrive only through [`FrameQueue::push`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the sole listener on `channel`.
    pub fn attach(channel: &dyn RawChannel) -> Self {
        let queue = Self::new();
        queue.listen_on(channel);
        queue
    }

    /// Attach after a stale registration already consumed `seen`.
    ///
    /// The stale registration can fire once more for the very first frame,
    /// so one identical leading delivery is ignored.
    pub fn attach_after_stale(channel: &dyn RawChannel, seen: RawFrame) -> Self {
        let queue = Self::new();
        queue.lock().stale_duplicate = Some(seen);
        queue.listen_on(channel);
        queue
    }

    fn listen_on(&self, channel: &dyn RawChannel) {
        let sink = self.clone();
        channel.set_listener(Box::new(move |delivery| sink.deliver(delivery)));
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Route one channel notification into the queue.
    pub fn deliver(&self, delivery: ChannelDelivery) {
        match delivery {
            ChannelDelivery::Frames(frames) => {
                let mut state = self.lock();
                for frame in frames {
                    push_locked(&mut state, frame);
                }
            }
            ChannelDelivery::Closed => self.close(TransportError::Closed),
            ChannelDelivery::Failed(message) => self.close(TransportError::Failed(message)),
        }
    }

    /// Accept one inbound frame.
    pub fn push(&self, frame: RawFrame) {
        push_locked(&mut self.lock(), frame);
    }

    /// Mark the channel dead. Buffered frames stay readable; after them every
    /// `next()` resolves with `fault`.
    pub fn close(&self, fault: TransportError) {
        let mut state = self.lock();
        if state.fault.is_some() {
            return;
        }
        match &fault {
            TransportError::Closed => debug!("frame channel closed"),
            other => warn!(error = %other, "frame channel faulted"),
        }
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(Err(fault.clone()));
        }
        state.fault = Some(fault);
    }

    /// Wait for the next frame in arrival order.
    pub async fn next(&self) -> Result<RawFrame, TransportError> {
        let rx = {
            let mut state = self.lock();
            if let Some(frame) = state.buffered.pop_front() {
                return Ok(frame);
            }
            if let Some(fault) = &state.fault {
                return Err(fault.clone());
            }
            // Drop registrations whose `next()` future was cancelled.
            state.waiters.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        let mut wait = PendingNext {
            queue: self,
            rx,
            finished: false,
        };
        let result = (&mut wait.rx).await;
        wait.finished = true;
        result.unwrap_or(Err(TransportError::Closed))
    }

    /// Number of frames waiting to be consumed.
    pub fn buffered_len(&self) -> usize {
        self.lock().buffered.len()
    }

    /// True once the channel closed or failed.
    pub fn is_closed(&self) -> bool {
        self.lock().fault.is_some()
    }
}

/// Parked `next()` call. If the future is dropped after a frame was handed
/// to it but before it was polled again, the frame goes back to the front of
/// the buffer, so `next()` is safe to race in `select!`.
struct PendingNext<'a> {
    queue: &'a FrameQueue,
    rx: oneshot::Receiver<Result<RawFrame, TransportError>>,
    finished: bool,
}

impl Drop for PendingNext<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.rx.close();
        if let Ok(Ok(frame)) = self.rx.try_recv() {
            self.queue.lock().buffered.push_front(frame);
        }
    }
}

fn push_locked(state: &mut QueueState, frame: RawFrame) {
    if state.fault.is_some() {
        debug!("dropping frame received after channel fault");
        return;
    }
    if state.accepted == 0 {
        if let Some(stale) = state.stale_duplicate.take() {
            if stale == frame {
                debug!("ignoring duplicate delivery from stale registration");
                return;
            }
        }
    }
    state.accepted = state.accepted.saturating_add(1);

    let mut pending = Ok(frame);
    while let Some(waiter) = state.waiters.pop_front() {
        match waiter.send(pending) {
            Ok(()) => return,
            // Receiver went away mid-wait; offer the frame to the next one.
            Err(returned) => pending = returned,
        }
    }
    if let Ok(frame) = pending {
        state.buffered.push_back(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryChannel;
    use std::time::Duration;
    use tokio::time::timeout;

    fn frames(texts: &[&str]) -> Vec<RawFrame> {
        texts.iter().map(|t| RawFrame::from(*t)).collect()
    }

    async fn next_frame(queue: &FrameQueue) -> Result<RawFrame, TransportError> {
        timeout(Duration::from_secs(2), queue.next())
            .await
            .expect("next timeout")
    }

    #[tokio::test]
    async fn batched_notification_yields_every_frame_in_order() {
        let channel = MemoryChannel::new();
        let queue = FrameQueue::attach(&channel);

        channel.deliver(frames(&["a", "b", "c"]));

        for expected in ["a", "b", "c"] {
            assert_eq!(next_frame(&queue).await.unwrap().as_str(), expected);
        }
        assert_eq!(queue.buffered_len(), 0);
    }

    #[tokio::test]
    async fn parked_waiter_receives_frame_pushed_later() {
        let queue = FrameQueue::new();
        let reader = queue.clone();
        let task = tokio::spawn(async move { reader.next().await });

        tokio::task::yield_now().await;
        queue.push(RawFrame::from("late"));

        let got = timeout(Duration::from_secs(2), task)
            .await
            .expect("join timeout")
            .expect("join");
        assert_eq!(got.unwrap().as_str(), "late");
    }

    #[tokio::test]
    async fn close_rejects_waiters_after_draining_buffer() {
        let channel = MemoryChannel::new();
        let queue = FrameQueue::attach(&channel);
        channel.deliver(frames(&["only"]));
        channel.close();

        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "only");
        assert_eq!(next_frame(&queue).await, Err(TransportError::Closed));
        assert_eq!(next_frame(&queue).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn failure_wakes_outstanding_waiters() {
        let queue = FrameQueue::new();
        let a = queue.clone();
        let b = queue.clone();
        let first = tokio::spawn(async move { a.next().await });
        let second = tokio::spawn(async move { b.next().await });
        tokio::task::yield_now().await;

        queue.deliver(ChannelDelivery::Failed("reset by peer".into()));

        for handle in [first, second] {
            let got = timeout(Duration::from_secs(2), handle)
                .await
                .expect("join timeout")
                .expect("join");
            assert_eq!(got, Err(TransportError::Failed("reset by peer".into())));
        }
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn stale_duplicate_is_ignored_exactly_once() {
        let channel = MemoryChannel::new();
        let queue = FrameQueue::attach_after_stale(&channel, RawFrame::from("first"));

        channel.deliver(frames(&["first", "second", "first"]));

        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "second");
        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "first");
    }

    #[tokio::test]
    async fn stale_marker_does_not_swallow_a_different_first_frame() {
        let channel = MemoryChannel::new();
        let queue = FrameQueue::attach_after_stale(&channel, RawFrame::from("old"));

        channel.deliver(frames(&["new", "old"]));

        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "new");
        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "old");
    }

    #[tokio::test]
    async fn cancelled_next_does_not_lose_frames() {
        let queue = FrameQueue::new();
        let abandoned = timeout(Duration::from_millis(20), queue.next()).await;
        assert!(abandoned.is_err(), "nothing was pushed yet");

        queue.push(RawFrame::from("kept"));
        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "kept");
    }

    #[tokio::test]
    async fn frame_handed_to_dropped_waiter_is_requeued() {
        let queue = FrameQueue::new();
        {
            let waiting = queue.next();
            tokio::pin!(waiting);
            tokio::select! {
                biased;
                _ = &mut waiting => panic!("queue is empty"),
                _ = std::future::ready(()) => {}
            }
            queue.push(RawFrame::from("first"));
            queue.push(RawFrame::from("second"));
        }
        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "first");
        assert_eq!(next_frame(&queue).await.unwrap().as_str(), "second");
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn batches_of_any_size_arrive_in_push_order(
                batches in proptest::collection::vec(
                    proptest::collection::vec("[a-z]{1,6}", 0..6),
                    0..8
                )
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");
                let expected: Vec<String> = batches.iter().flatten().cloned().collect();
                let got = rt.block_on(async {
                    let channel = MemoryChannel::new();
                    let queue = FrameQueue::attach(&channel);
                    for batch in &batches {
                        channel.deliver(batch.iter().map(|s| RawFrame::from(s.as_str())).collect());
                    }
                    channel.close();
                    let mut out = Vec::new();
                    while let Ok(frame) = queue.next().await {
                        out.push(frame.into_string());
                    }
                    out
                });
                prop_assert_eq!(got, expected);
            }
        }
    }
}
