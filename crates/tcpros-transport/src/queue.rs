//! Bounded per-subscriber send queue.
//!
//! `publish` pushes the same encoded frame into every subscriber's queue;
//! each connection task pops and writes its own queue in FIFO order, so a
//! slow subscriber never stalls the others.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Notify, watch};

use crate::config::OverflowPolicy;

/// An encoded frame shared by every queue it was pushed to.
pub type Frame = Arc<[u8]>;

/// Outcome of [`SendQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Queued after evicting the oldest frame.
    DroppedOldest,
    /// The queue was full and the policy says disconnect; the queue is now closed.
    Overflow,
    Closed,
}

impl Push {
    /// Returns true if the frame will be sent.
    pub fn is_queued(self) -> bool {
        matches!(self, Self::Queued | Self::DroppedOldest)
    }
}

#[derive(Debug, Default)]
struct State {
    frames: VecDeque<Frame>,
    closed: bool,
    overflowed: bool,
    dropped: u64,
}

#[derive(Debug)]
pub struct SendQueue {
    state: Mutex<State>,
    notify: Notify,
    closed: watch::Sender<bool>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl SendQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            closed: watch::Sender::new(false),
            capacity: capacity.max(1),
            policy,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, frame: Frame) -> Push {
        let outcome = {
            let mut state = self.state();
            if state.closed {
                return Push::Closed;
            }
            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                Push::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.frames.pop_front();
                        state.frames.push_back(frame);
                        state.dropped += 1;
                        Push::DroppedOldest
                    }
                    OverflowPolicy::Disconnect => {
                        state.closed = true;
                        state.overflowed = true;
                        state.frames.clear();
                        Push::Overflow
                    }
                }
            }
        };
        if outcome == Push::Overflow {
            self.closed.send_replace(true);
        }
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next frame. Returns `None` once the queue is closed;
    /// frames still queued at that point are discarded.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            {
                let mut state = self.state();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.state().closed = true;
        self.closed.send_replace(true);
        self.notify.notify_one();
    }

    /// Resolves once the queue is closed, whether by [`close`](Self::close)
    /// or by an overflow.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Returns true if the queue closed because the subscriber fell behind.
    pub fn overflowed(&self) -> bool {
        self.state().overflowed
    }

    pub fn len(&self) -> usize {
        self.state().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of frames evicted by [`OverflowPolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.state().dropped
    }
}
