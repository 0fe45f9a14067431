//! Periodic ping liveness check (§4.5). Runs as its own task alongside a
//! connection's read loop, signaling across a small set of atomics so the
//! read loop never needs to synchronize on a lock to see the current state.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::error::close_code;
use crate::frame::{Frame, OpCode};
use crate::write::Writer;

pub struct Liveness {
    awaiting_pong: AtomicBool,
    is_closed: AtomicBool,
    close_code: AtomicU16,
}

impl Liveness {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            awaiting_pong: AtomicBool::new(false),
            is_closed: AtomicBool::new(false),
            close_code: AtomicU16::new(close_code::NO_STATUS),
        })
    }

    pub fn record_pong(&self) {
        self.awaiting_pong.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    pub fn close_code(&self) -> u16 {
        self.close_code.load(Ordering::SeqCst)
    }

    /// Records that the connection is closed with the given wire close code.
    /// Called by the liveness scheduler on a missed pong, and by the read
    /// loop when a close frame is exchanged or the transport reaches EOF.
    pub(crate) fn mark_closed(&self, code: u16) {
        self.close_code.store(code, Ordering::SeqCst);
        self.is_closed.store(true, Ordering::SeqCst);
    }

    /// Spawns the periodic ping task. On each tick: if the previous ping is
    /// still unanswered, the connection is forced abnormally closed (1006)
    /// via `force_close`; otherwise a fresh empty-payload ping is sent and
    /// `awaiting_pong` is set for the next tick to observe.
    pub fn spawn_scheduler(
        self: Arc<Self>,
        writer: Arc<Mutex<Writer>>,
        ping_interval: Duration,
        force_close: oneshot::Sender<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(ping_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            let mut force_close = Some(force_close);

            loop {
                ticker.tick().await;
                if self.is_closed() {
                    return;
                }

                if self.awaiting_pong.swap(true, Ordering::SeqCst) {
                    warn!("no pong received within the ping interval, closing abnormally");
                    self.mark_closed(close_code::ABNORMAL);
                    if let Some(sender) = force_close.take() {
                        let _ = sender.send(());
                    }
                    return;
                }

                debug!("sending liveness ping");
                let mut writer = writer.lock().await;
                if writer
                    .write_frame(Frame::control(OpCode::Ping, Vec::new()))
                    .await
                    .is_err()
                {
                    self.mark_closed(close_code::ABNORMAL);
                    return;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_closed_with_no_status_code() {
        let liveness = Liveness::new();
        assert!(!liveness.is_closed());
        assert_eq!(liveness.close_code(), close_code::NO_STATUS);
    }

    #[test]
    fn record_pong_clears_awaiting_flag() {
        let liveness = Liveness::new();
        liveness.awaiting_pong.store(true, Ordering::SeqCst);
        liveness.record_pong();
        assert!(!liveness.awaiting_pong.load(Ordering::SeqCst));
    }

    #[test]
    fn mark_closed_sets_both_flags() {
        let liveness = Liveness::new();
        liveness.mark_closed(close_code::ABNORMAL);
        assert!(liveness.is_closed());
        assert_eq!(liveness.close_code(), close_code::ABNORMAL);
    }
}
