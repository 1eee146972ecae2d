//! Periodic reconciliation scan driver.
//!
//! Runs on its own thread with a current-thread tokio runtime so the wait
//! between scans can be interrupted by a manual trigger or by shutdown.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use crate::error::WorkerError;

/// Handle to a running scan loop. Dropping it without [`ScanScheduler::stop`]
/// also ends the loop, but does not wait for the thread.
pub struct ScanScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ScanScheduler {
    /// Scans immediately, then once per `interval` and whenever a message
    /// arrives on `trigger_rx`.
    pub fn start<F>(
        interval: Duration,
        scan: F,
        mut trigger_rx: broadcast::Receiver<()>,
    ) -> Result<Self, WorkerError>
    where
        F: Fn() -> crate::error::Result<usize> + Send + 'static,
    {
        let spawn_err = |e: std::io::Error| WorkerError::SpawnFailed {
            name: "scan scheduler".to_string(),
            source: e,
        };

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(spawn_err)?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = thread::Builder::new()
            .name("filenorm-scan".to_string())
            .spawn(move || {
                rt.block_on(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.changed() => break,
                            _ = ticker.tick() => {},
                            received = trigger_rx.recv() => match received {
                                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                                    log::info!("Manual scan triggered");
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            },
                        }

                        if *shutdown_rx.borrow() {
                            break;
                        }

                        match scan() {
                            Ok(queued) if queued > 0 => {
                                log::info!("Scheduled scan queued {} jobs", queued)
                            }
                            Ok(_) => {}
                            Err(e) => log::error!("Scheduled scan failed: {}", e),
                        }
                    }

                    log::debug!("Scan scheduler stopped");
                });
            })
            .map_err(spawn_err)?;

        Ok(Self {
            shutdown_tx,
            handle,
        })
    }

    /// Interrupts the wait and joins the thread. A scan already in progress
    /// finishes first.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.join() {
            log::error!("Scan scheduler panicked: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn counting_scan(counter: &Arc<AtomicUsize>) -> impl Fn() -> crate::error::Result<usize> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    }

    fn wait_for(counter: &AtomicUsize, at_least: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) >= at_least {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_scans_immediately_on_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let scheduler =
            ScanScheduler::start(Duration::from_secs(3600), counting_scan(&count), trigger_rx)
                .unwrap();

        assert!(wait_for(&count, 1));
        scheduler.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scans_on_every_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let scheduler =
            ScanScheduler::start(Duration::from_millis(20), counting_scan(&count), trigger_rx)
                .unwrap();

        assert!(wait_for(&count, 3));
        scheduler.stop();
    }

    #[test]
    fn test_manual_trigger() {
        let count = Arc::new(AtomicUsize::new(0));
        let (trigger_tx, trigger_rx) = broadcast::channel(4);
        let scheduler =
            ScanScheduler::start(Duration::from_secs(3600), counting_scan(&count), trigger_rx)
                .unwrap();

        assert!(wait_for(&count, 1));
        trigger_tx.send(()).unwrap();
        assert!(wait_for(&count, 2));
        scheduler.stop();
    }

    #[test]
    fn test_stop_interrupts_long_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let scheduler =
            ScanScheduler::start(Duration::from_secs(3600), counting_scan(&count), trigger_rx)
                .unwrap();
        assert!(wait_for(&count, 1));

        let started = Instant::now();
        scheduler.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_scan_errors_do_not_stop_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let failing = move || -> crate::error::Result<usize> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(crate::error::StorageError::SourceNotFound("incoming".to_string()).into())
        };
        let (_trigger_tx, trigger_rx) = broadcast::channel(4);
        let scheduler =
            ScanScheduler::start(Duration::from_millis(20), failing, trigger_rx).unwrap();

        assert!(wait_for(&count, 2));
        scheduler.stop();
    }
}
