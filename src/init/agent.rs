// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::{BoundedSender, bounded};
use crate::exporters::gelf::{self, DispatchSink, DispatchStats, GelfUdpTransport, Transport};
use crate::init::config::AgentConfig;
use crate::init::wait;
use crate::receivers::file::{RawLine, SaveRequest, TailCoordinator, run_save_timer};
use crate::shutdown::{ShutdownEvent, ShutdownTrigger};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tower::BoxError;
use tracing::{debug, error, info, warn};

/// How the agent stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    /// The event that started the shutdown
    pub event: ShutdownEvent,
    /// Shutdown overran the grace period and was cut short
    pub forced: bool,
    pub stats: DispatchStats,
}

impl ShutdownReport {
    pub fn exit_code(&self) -> u8 {
        if self.forced || self.event.is_error() {
            1
        } else {
            0
        }
    }
}

pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Runs until `signal` resolves or the tailing or sending side gives up,
    /// sending to the configured collector over UDP. `signal` yields the name
    /// of the signal received.
    pub async fn run<S>(self, signal: S) -> Result<ShutdownReport, BoxError>
    where
        S: Future<Output = String> + Send + 'static,
    {
        let exporter = self.config.exporter.clone();
        self.run_with(
            async move { GelfUdpTransport::connect(&exporter).await },
            signal,
        )
        .await
    }

    /// Same as [`Agent::run`], with the transport produced by `connect`.
    pub async fn run_with<T, C, S>(self, connect: C, signal: S) -> Result<ShutdownReport, BoxError>
    where
        T: Transport + 'static,
        C: Future<Output = gelf::Result<T>> + Send + 'static,
        S: Future<Output = String> + Send + 'static,
    {
        let config = self.config;
        config.validate()?;

        info!(
            file = ?config.receiver.path,
            collector = %config.exporter.address(),
            follow = config.receiver.follow,
            "Starting gelftail."
        );

        let trigger = ShutdownTrigger::new();
        let listener = trigger.listener();

        let (lines_tx, lines_rx) = bounded::<RawLine>(config.queue_size);
        let (save_tx, save_rx) = bounded::<SaveRequest>(1);

        let mut task_set: JoinSet<Result<(), BoxError>> = JoinSet::new();

        let signal_trigger = trigger.clone();
        task_set.spawn(async move {
            let name = signal.await;
            signal_trigger.fire(ShutdownEvent::ExternalSignal(name));
            Ok(())
        });

        let coordinator = TailCoordinator::new(
            config.receiver.clone(),
            lines_tx,
            save_rx,
            trigger.clone(),
        );
        task_set.spawn(coordinator.run());

        let timer_tx = save_tx.clone();
        let save_interval = config.receiver.save_interval;
        task_set.spawn(async move {
            run_save_timer(save_interval, timer_tx).await;
            Ok(())
        });

        let sink_trigger = trigger.clone();
        let mut dispatch = tokio::spawn(async move {
            match connect.await {
                Ok(transport) => {
                    DispatchSink::new(transport, lines_rx, sink_trigger)
                        .run()
                        .await
                }
                Err(e) => {
                    sink_trigger.fire(ShutdownEvent::SinkError(format!(
                        "cannot open GELF transport: {}",
                        e
                    )));
                    DispatchStats::default()
                }
            }
        });

        let event = listener.wait().await;
        if event.is_error() {
            error!(reason = %event, "Shutting down.");
        } else {
            info!(reason = %event, "Shutting down.");
        }

        let stopping = shutdown(&config, &event, save_tx, &mut task_set, &mut dispatch);
        let (stats, forced) = match event {
            // only operator signals are held to the grace period
            ShutdownEvent::ExternalSignal(_) => match timeout(config.grace_period, stopping).await {
                Ok(stats) => (stats, false),
                Err(_) => {
                    error!("Shutdown was ignored, bailing out now.");
                    dispatch.abort();
                    task_set.abort_all();
                    (DispatchStats::default(), true)
                }
            },
            _ => (stopping.await, false),
        };

        Ok(ShutdownReport {
            event,
            forced,
            stats,
        })
    }
}

async fn shutdown(
    config: &AgentConfig,
    event: &ShutdownEvent,
    save_tx: BoundedSender<SaveRequest>,
    task_set: &mut JoinSet<Result<(), BoxError>>,
    dispatch: &mut JoinHandle<DispatchStats>,
) -> DispatchStats {
    // the tailing side saves on its own when it raised the event
    if !event.from_source() {
        request_final_save(&save_tx, config.final_save_timeout).await;
    }
    drop(save_tx);

    // stopping the coordinator closes the line queue
    if let Err(e) = wait::abort_tasks_with_timeout(task_set, config.drain_timeout).await {
        warn!(error = %e, "Tailing tasks did not stop cleanly.");
    }

    match timeout(config.drain_timeout, &mut *dispatch).await {
        Ok(Ok(stats)) => stats,
        Ok(Err(e)) => {
            error!("Failed to join with dispatch task: {:?}", e);
            DispatchStats::default()
        }
        Err(_) => {
            warn!(
                timeout = ?config.drain_timeout,
                "Dispatch did not drain in time, dropping queued lines."
            );
            dispatch.abort();
            DispatchStats::default()
        }
    }
}

async fn request_final_save(save_tx: &BoundedSender<SaveRequest>, wait_for: Duration) {
    let (ack_tx, ack_rx) = oneshot::channel();
    let request = async {
        save_tx.send(SaveRequest::Final(ack_tx)).await.ok()?;
        ack_rx.await.ok()
    };

    match timeout(wait_for, request).await {
        Ok(Some(offset)) => debug!(offset, "Final position saved."),
        Ok(None) => debug!("Tailing already stopped, skipping final save."),
        Err(_) => warn!(timeout = ?wait_for, "Timed out waiting for final position save."),
    }
}
