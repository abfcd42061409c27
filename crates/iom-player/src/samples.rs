//! Bounded queues of interleaved `f32` samples.
//!
//! [`SampleQueue`] is the hand-off format between stages:
//! - decode thread → queue
//! - resampler thread → queue
//! - output callback drains the queue without blocking
//!
//! Closing a queue wakes every waiter; producers stop accepting data and consumers
//! drain what is left.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Thread-safe bounded queue of interleaved samples.
///
/// Samples are interleaved (`frame0[ch0], frame0[ch1], frame1[ch0], ...`) and the
/// channel count is fixed for the lifetime of the queue. A single [`Condvar`] signals
/// every state change; the `done` flag lives under the same mutex as the samples.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

struct Inner {
    samples: VecDeque<f32>,
    done: bool,
}

/// How [`SampleQueue::pop`] waits for data.
pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then return up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Return up to `max_frames` immediately, `None` when empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio.
///
/// Non-finite or non-positive durations fall back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the producer closed the queue. Buffered samples may remain.
    pub fn is_done(&self) -> bool {
        self.inner.lock().unwrap().done
    }

    /// Closed and fully drained.
    pub fn is_finished(&self) -> bool {
        let g = self.inner.lock().unwrap();
        g.done && g.samples.is_empty()
    }

    /// Mark the queue finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns early, dropping the rest, if the queue is closed while waiting.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();

            while g.samples.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap();
            }
            if g.done {
                return;
            }

            let room = self.max_buffered_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop whole frames using `strategy`.
    ///
    /// Returns `None` when the queue is closed and nothing can satisfy the request.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap();
                }
                if g.samples.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.len() < self.channels && !g.done {
                    g = self.cv.wait(g).unwrap();
                }
                let frames = (g.samples.len() / self.channels).min(max_frames);
                if frames == 0 {
                    return None;
                }
                frames * self.channels
            }
            PopStrategy::NonBlocking { max_frames } => {
                let frames = (g.samples.len() / self.channels).min(max_frames);
                if frames == 0 {
                    return None;
                }
                frames * self.channels
            }
        };

        let out: Vec<f32> = g.samples.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }
}
