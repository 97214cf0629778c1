//! Follower bookkeeping: one entry per worker pid, each with a lazily
//! opened shared-memory channel and an ordered outbox of encoded action
//! frames.

use std::collections::VecDeque;
use std::path::PathBuf;
use weir_shm::Ring;

/// Name of a follower's channel region inside its pid directory.
pub const CHANNEL_NAME: &str = "config-follower-channel";

/// Frames a follower may have queued before the oldest are dropped. A
/// follower this far behind has to be restarted by the supervisor anyway;
/// an unbounded queue would just leak against a dead pid.
const OUTBOX_LIMIT: usize = 65536;

/// A follower worker process, from the leader's point of view.
#[derive(Debug)]
pub struct Follower {
    pid: u32,
    channel: Option<Ring>,
    outbox: VecDeque<Vec<u8>>,
}

impl Follower {
    /// Tracks the worker with the given pid.
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            channel: None,
            outbox: VecDeque::new(),
        }
    }

    /// The worker's pid.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Frames waiting to be shipped.
    pub fn backlog(&self) -> usize {
        self.outbox.len()
    }

    fn channel_path(&self) -> PathBuf {
        weir_shm::process_dir(self.pid).join(CHANNEL_NAME)
    }

    /// Appends a frame to the outbox, dropping the oldest frame when the
    /// bound is hit.
    pub fn enqueue(&mut self, frame: Vec<u8>) {
        if self.outbox.len() >= OUTBOX_LIMIT {
            self.outbox.pop_front();
            tracing::warn!(pid = self.pid, "outbox full, dropping oldest frame");
        }
        self.outbox.push_back(frame);
    }

    /// Ships as much of the outbox as the channel accepts this tick. The
    /// channel is opened lazily and retried every tick until the follower
    /// has created it; a frame the ring refuses stays at the head so order
    /// is preserved, and nothing behind it is attempted.
    pub fn service(&mut self) {
        if self.channel.is_none() {
            match Ring::open(&self.channel_path()) {
                Ok(ring) => {
                    tracing::debug!(pid = self.pid, "follower channel open");
                    self.channel = Some(ring);
                }
                Err(err) => {
                    tracing::debug!(pid = self.pid, "follower channel not ready: {err}");
                    return;
                }
            }
        }
        let channel = self.channel.as_ref().expect("just opened");
        while let Some(frame) = self.outbox.front() {
            if channel.put(frame) {
                self.outbox.pop_front();
            } else {
                break;
            }
        }
    }
}
