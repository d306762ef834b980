use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Idle,
    Running,
}

/// Fixed-interval driver around the pipeline. One cycle runs to completion
/// (or failure) before the next begins; a failed cycle is logged at the
/// boundary and the loop goes back to sleep instead of terminating.
pub struct Scheduler {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Scheduler {
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wire the shutdown flag to ctrl-c.
    pub fn install_signal_handler(&self) {
        let flag = self.shutdown.clone();
        let _ = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        });
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run until shutdown is requested.
    pub fn run(&self, pipeline: &Pipeline) {
        info!(
            "scheduler started - interval={}s",
            self.interval.as_secs()
        );
        let mut state = LoopState::Running;
        while !self.shutdown.load(Ordering::SeqCst) {
            if state == LoopState::Idle {
                self.sleep_interval();
                if self.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                state = LoopState::Running;
            }
            let started = Instant::now();
            match pipeline.run_cycle(Utc::now()) {
                Ok(()) => info!(
                    "cycle completed - duration={:.2}s",
                    started.elapsed().as_secs_f64()
                ),
                // Whatever writes completed stay committed; the cycle is
                // abandoned and the loop continues after the interval.
                Err(e) => error!("cycle failed: {e}"),
            }
            state = LoopState::Idle;
            debug!("state: idle");
        }
        info!("shutdown requested - scheduler stopping");
    }

    /// Interval sleep in short slices so a shutdown request is not delayed
    /// by the full interval.
    fn sleep_interval(&self) {
        let deadline = Instant::now() + self.interval;
        while Instant::now() < deadline && !self.shutdown.load(Ordering::SeqCst) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(Duration::from_millis(200)));
        }
    }
}
