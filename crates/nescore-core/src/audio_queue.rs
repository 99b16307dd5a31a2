//! Bounded audio sample queue shared between the emulation thread and an
//! audio-output thread.
//!
//! The emulator decimates and filters one sample roughly every 40.6 CPU
//! cycles (see [`crate::bus::NesBus::step_apu`]) and pushes it here; a host
//! audio thread drains it with [`AudioQueue::pop_blocking`] (or
//! [`crate::NesBus::poll_audio_sample`]). Both sides respect a shutdown
//! sentinel that wakes blocked waiters without requiring a sample to flow,
//! so the audio thread can be torn down cleanly when emulation stops.

#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;
#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(feature = "std")]
use std::sync::{
    Arc, Condvar, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// Default capacity of a newly constructed queue, in samples.
///
/// At 44,100 Hz this is roughly 93 ms of buffered audio.
pub const DEFAULT_CAPACITY: usize = 4096;

#[cfg(feature = "std")]
struct Inner {
    buffer: Mutex<VecDeque<f64>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    shutdown: AtomicBool,
}

/// A bounded, blocking ring of audio samples.
///
/// Cloning an `AudioQueue` is cheap and shares the same underlying ring (it
/// wraps an `Arc`), which is how a handle gets handed to a dedicated audio
/// thread while the emulation thread keeps producing into the same queue.
#[cfg(feature = "std")]
#[derive(Clone)]
pub struct AudioQueue {
    inner: Arc<Inner>,
}

#[cfg(feature = "std")]
impl AudioQueue {
    /// Create a new queue with room for `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Push a sample, blocking while the queue is full.
    ///
    /// Returns without enqueuing if the queue has been shut down.
    pub fn push_blocking(&self, sample: f64) {
        let mut buf = self.inner.buffer.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                return;
            }
            if buf.len() < self.inner.capacity {
                buf.push_back(sample);
                self.inner.not_empty.notify_one();
                return;
            }
            buf = self
                .inner
                .not_full
                .wait(buf)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Pop the next sample, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub fn pop_blocking(&self) -> Option<f64> {
        let mut buf = self.inner.buffer.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(sample) = buf.pop_front() {
                self.inner.not_full.notify_one();
                return Some(sample);
            }
            if self.inner.shutdown.load(Ordering::Acquire) {
                return None;
            }
            buf = self
                .inner
                .not_empty
                .wait(buf)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Pop the next sample without blocking.
    #[must_use]
    pub fn try_pop(&self) -> Option<f64> {
        let mut buf = self.inner.buffer.lock().unwrap_or_else(|e| e.into_inner());
        let sample = buf.pop_front();
        if sample.is_some() {
            self.inner.not_full.notify_one();
        }
        sample
    }

    /// Wake every blocked waiter without enqueuing or dequeuing a sample.
    ///
    /// After this call, `push_blocking` returns immediately without pushing
    /// and `pop_blocking` drains whatever remains before returning `None`.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.not_empty.notify_all();
        self.inner.not_full.notify_all();
    }

    /// Number of samples currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .map(|buf| buf.len())
            .unwrap_or(0)
    }

    /// Whether the queue currently holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(feature = "std")]
impl core::fmt::Debug for AudioQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// `no_std` fallback: a plain bounded ring with no blocking or cross-thread
/// sharing. Pushing past capacity drops the oldest queued sample; popping
/// from an empty queue returns `None` immediately. Suitable for a
/// single-threaded embedding that polls the queue itself.
#[cfg(not(feature = "std"))]
#[derive(Debug, Clone)]
pub struct AudioQueue {
    buffer: VecDeque<f64>,
    capacity: usize,
}

#[cfg(not(feature = "std"))]
impl AudioQueue {
    /// Create a new queue with room for `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, dropping the oldest one if the queue is full.
    pub fn push_blocking(&mut self, sample: f64) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
    }

    /// Pop the next sample, or `None` if the queue is empty.
    pub fn pop_blocking(&mut self) -> Option<f64> {
        self.buffer.pop_front()
    }

    /// Pop the next sample, or `None` if the queue is empty.
    #[must_use]
    pub fn try_pop(&mut self) -> Option<f64> {
        self.buffer.pop_front()
    }

    /// No-op: there is nothing to wake without a second thread.
    pub fn shutdown(&mut self) {}

    /// Number of samples currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the queue currently holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
