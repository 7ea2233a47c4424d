//! Background task expiring stale reservations.
//!
//! Runs a sweep every interval and on demand through a command channel. Each
//! sweep goes through the per-item locks like any other mutation.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::{
    error::{AppError, AppResult},
    models::SweepReport,
};

use super::reservations::ReservationQueue;

enum SweepCommand {
    RunNow(oneshot::Sender<AppResult<SweepReport>>),
    Shutdown,
}

/// Handle used to drive a running sweeper
#[derive(Clone)]
pub struct SweeperHandle {
    commands: mpsc::Sender<SweepCommand>,
}

impl SweeperHandle {
    /// Run a sweep right away and wait for its report
    pub async fn run_now(&self) -> AppResult<SweepReport> {
        let (reply, report) = oneshot::channel();
        self.commands
            .send(SweepCommand::RunNow(reply))
            .await
            .map_err(|_| AppError::Internal("Expiry sweeper is not running".to_string()))?;
        report
            .await
            .map_err(|_| AppError::Internal("Expiry sweeper dropped the request".to_string()))?
    }

    /// Ask the sweeper to stop after its current sweep
    pub async fn shutdown(&self) {
        // Already stopped if the channel is closed
        let _ = self.commands.send(SweepCommand::Shutdown).await;
    }
}

pub struct ExpirySweeper {
    queue: ReservationQueue,
    period: Duration,
    commands: mpsc::Receiver<SweepCommand>,
}

impl ExpirySweeper {
    /// Start the sweeper on its own task
    pub fn spawn(queue: ReservationQueue, period: Duration) -> (SweeperHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let sweeper = Self {
            queue,
            period,
            commands: rx,
        };
        let task = tokio::spawn(sweeper.run());
        (SweeperHandle { commands: tx }, task)
    }

    async fn run(self) {
        let Self {
            queue,
            period,
            mut commands,
        } = self;

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        timer.tick().await;

        tracing::info!(period_secs = period.as_secs(), "Expiry sweeper started");

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = sweep(&queue).await {
                        tracing::warn!("Scheduled hold sweep failed: {}", e);
                    }
                }
                command = commands.recv() => match command {
                    Some(SweepCommand::RunNow(reply)) => {
                        let _ = reply.send(sweep(&queue).await);
                    }
                    Some(SweepCommand::Shutdown) | None => break,
                },
            }
        }

        tracing::info!("Expiry sweeper stopped");
    }
}

async fn sweep(queue: &ReservationQueue) -> AppResult<SweepReport> {
    let report = queue.sweep_expired().await?;
    queue.prune_locks();
    Ok(report)
}
