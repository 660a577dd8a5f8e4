// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::state::{now_millis, EpochMillis};

use super::poller::{InProgressPoller, PollReport};
use super::{RuntimeEvent, RuntimeOptions};

/// Drives the poller in response to `RuntimeEvent`s.
///
/// Poll cycles do blocking file I/O and run listeners synchronously, so each
/// one runs on the blocking pool. The poller is moved into the blocking task
/// and handed back when it finishes, which also guarantees that two cycles
/// never overlap.
pub struct Runtime {
    poller: Option<InProgressPoller>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    options: RuntimeOptions,
    cycles: u64,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("poller", &self.poller)
            .field("options", &self.options)
            .field("cycles", &self.cycles)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        poller: InProgressPoller,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            poller: Some(poller),
            event_rx,
            options,
            cycles: 0,
        }
    }

    /// Main event loop. Returns the poller so callers can inspect it.
    pub async fn run(mut self) -> Result<InProgressPoller> {
        info!("docs-finalizer runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            match event {
                RuntimeEvent::PollRequested { now } => {
                    let report = self.poll_once(now).await?;
                    self.cycles += 1;
                    if report.failed > 0 {
                        warn!(?report, "poll cycle finished with failing jobs");
                    }
                    if self.options.exit_after_first_poll {
                        info!("single poll requested; stopping runtime");
                        break;
                    }
                }
                RuntimeEvent::ShutdownRequested => {
                    info!("shutdown requested; stopping runtime");
                    break;
                }
            }
        }

        info!(cycles = self.cycles, "runtime exiting");
        self.poller
            .take()
            .ok_or_else(|| anyhow!("poller lost during a poll cycle").into())
    }

    async fn poll_once(&mut self, now: EpochMillis) -> Result<PollReport> {
        let mut poller = self
            .poller
            .take()
            .ok_or_else(|| anyhow!("poller lost during a poll cycle"))?;

        let (poller, report) = tokio::task::spawn_blocking(move || {
            let report = poller.poll(now);
            (poller, report)
        })
        .await
        .map_err(|e| anyhow!("poll cycle panicked: {e}"))?;

        self.poller = Some(poller);
        debug!(?report, "poll cycle done");
        Ok(report)
    }
}

/// Send `PollRequested` every `period`, starting immediately.
///
/// Ticks that fall due while a cycle is still running are delayed rather than
/// bunched up. The task ends when the runtime drops its receiver.
pub fn spawn_ticker(tx: mpsc::Sender<RuntimeEvent>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let event = RuntimeEvent::PollRequested { now: now_millis() };
            if tx.send(event).await.is_err() {
                debug!("runtime gone; ticker stopping");
                break;
            }
        }
    })
}
