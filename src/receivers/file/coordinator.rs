// SPDX-License-Identifier: Apache-2.0

//! The tailing side of the agent.
//!
//! A [`TailCoordinator`] owns the follower and the position store. It forwards
//! every line to the line queue in order and answers save requests coming from
//! the periodic timer or from the shutdown sequence. It is the only writer of
//! the position record.

use crate::bounded_channel::{BoundedReceiver, BoundedSender};
use crate::receivers::file::config::FileReceiverConfig;
use crate::receivers::file::file_id::FileId;
use crate::receivers::file::follower::{FileFollower, LineFollower, RawLine};
use crate::receivers::file::position::PositionStore;
use crate::shutdown::{ShutdownEvent, ShutdownTrigger};
use std::time::Duration;
use tokio::select;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tower::BoxError;
use tracing::{debug, warn};

pub enum SaveRequest {
    Periodic,
    /// Answered with the offset that was saved.
    Final(oneshot::Sender<u64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Starting,
    Following,
    Closed,
}

pub struct TailCoordinator {
    config: FileReceiverConfig,
    lines_tx: BoundedSender<RawLine>,
    save_rx: BoundedReceiver<SaveRequest>,
    shutdown: ShutdownTrigger,
    state: TailState,
}

impl TailCoordinator {
    pub fn new(
        config: FileReceiverConfig,
        lines_tx: BoundedSender<RawLine>,
        save_rx: BoundedReceiver<SaveRequest>,
        shutdown: ShutdownTrigger,
    ) -> Self {
        Self {
            config,
            lines_tx,
            save_rx,
            shutdown,
            state: TailState::Starting,
        }
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// Resolves the resume offset, opens the file and follows it. Failures
    /// to open are raised as a source error.
    pub async fn run(mut self) -> Result<(), BoxError> {
        let store = self
            .config
            .resume_enabled()
            .then(|| PositionStore::new(&self.config.state_path));

        let start_offset = match &store {
            None => 0,
            Some(store) => match FileId::from_path(&self.config.path) {
                Ok(file_id) => store.load(file_id.ino()),
                Err(e) => {
                    self.close(ShutdownEvent::SourceError(format!(
                        "cannot open {}: {}",
                        self.config.path.display(),
                        e
                    )));
                    return Ok(());
                }
            },
        };

        let follower = match FileFollower::open(
            &self.config.path,
            start_offset,
            self.config.follow,
            self.config.poll_interval,
        )
        .await
        {
            Ok(follower) => follower,
            Err(e) => {
                self.close(ShutdownEvent::SourceError(format!(
                    "cannot open {}: {}",
                    self.config.path.display(),
                    e
                )));
                return Ok(());
            }
        };

        self.follow(follower, store).await;
        Ok(())
    }

    /// Forwards lines until the follower closes or fails, serving save
    /// requests in between. The position is saved once more on the way out.
    pub async fn follow<F: LineFollower>(mut self, mut follower: F, store: Option<PositionStore>) {
        self.transition(TailState::Following);

        loop {
            select! {
                line = follower.next_line() => match line {
                    Ok(Some(line)) => {
                        if self.lines_tx.send(line).await.is_err() {
                            debug!("Line queue closed, stopping tailing");
                            break;
                        }
                    }
                    Ok(None) => {
                        save_position(store.as_ref(), follower.inode(), follower.offset());
                        self.close(ShutdownEvent::SourceExhausted);
                        break;
                    }
                    Err(e) => {
                        save_position(store.as_ref(), follower.inode(), follower.offset());
                        self.close(ShutdownEvent::SourceError(format!(
                            "cannot read {}: {}",
                            self.config.path.display(),
                            e
                        )));
                        break;
                    }
                },
                Some(request) = self.save_rx.next() => {
                    let offset = follower.offset();
                    save_position(store.as_ref(), follower.inode(), offset);
                    if let SaveRequest::Final(ack) = request {
                        // the requester may have given up waiting
                        let _ = ack.send(offset);
                    }
                }
            }
        }
    }

    fn close(&mut self, event: ShutdownEvent) {
        self.transition(TailState::Closed);
        self.shutdown.fire(event);
    }

    fn transition(&mut self, state: TailState) {
        debug!(from = ?self.state, to = ?state, path = ?self.config.path, "Tailing state changed");
        self.state = state;
    }
}

fn save_position(store: Option<&PositionStore>, inode: u64, offset: u64) {
    match store {
        Some(store) => {
            if let Err(e) = store.save(inode, offset) {
                warn!(error = %e, state_file = ?store.path(), "Failed to save position");
            }
        }
        None => debug!(offset, "Reading, now at offset"),
    }
}

/// Sends a periodic save request every `period` until the coordinator is gone.
pub async fn run_save_timer(period: Duration, save_tx: BoundedSender<SaveRequest>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if save_tx.send(SaveRequest::Periodic).await.is_err() {
            debug!("Save requests closed, stopping save timer");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::bounded;
    use crate::receivers::file::error::{Error, Result};
    use std::collections::VecDeque;
    use std::io;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Replays a fixed list of reads, then either closes or waits forever.
    struct ScriptedFollower {
        reads: VecDeque<Result<Option<RawLine>>>,
        hold_open: bool,
        offset: u64,
    }

    impl ScriptedFollower {
        fn new(lines: &[&str], hold_open: bool) -> Self {
            Self {
                reads: lines
                    .iter()
                    .map(|l| Ok(Some(l.as_bytes().to_vec())))
                    .collect(),
                hold_open,
                offset: 0,
            }
        }
    }

    impl LineFollower for ScriptedFollower {
        async fn next_line(&mut self) -> Result<Option<RawLine>> {
            match self.reads.pop_front() {
                Some(Ok(Some(line))) => {
                    self.offset += line.len() as u64 + 1;
                    Ok(Some(line))
                }
                Some(other) => other,
                None if self.hold_open => std::future::pending().await,
                None => Ok(None),
            }
        }

        fn offset(&self) -> u64 {
            self.offset
        }

        fn inode(&self) -> u64 {
            77
        }
    }

    struct Harness {
        dir: TempDir,
        trigger: ShutdownTrigger,
        lines_rx: BoundedReceiver<RawLine>,
        save_tx: BoundedSender<SaveRequest>,
        coordinator: TailCoordinator,
    }

    fn harness(follow: bool) -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = FileReceiverConfig::new(dir.path().join("app.log"));
        config.follow = follow;
        config.poll_interval = Duration::from_millis(10);

        let trigger = ShutdownTrigger::new();
        let (lines_tx, lines_rx) = bounded(16);
        let (save_tx, save_rx) = bounded(1);
        let coordinator = TailCoordinator::new(config, lines_tx, save_rx, trigger.clone());
        assert_eq!(TailState::Starting, coordinator.state());

        Harness {
            dir,
            trigger,
            lines_rx,
            save_tx,
            coordinator,
        }
    }

    async fn drain(rx: &mut BoundedReceiver<RawLine>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = timeout(WAIT, rx.next()).await.unwrap() {
            lines.push(String::from_utf8(line).unwrap());
        }
        lines
    }

    #[tokio::test]
    async fn forwards_lines_then_reports_exhaustion() {
        let mut h = harness(true);
        let store = PositionStore::new(h.dir.path().join("app.log.state"));
        let follower = ScriptedFollower::new(&["a", "bb", "ccc"], false);

        h.coordinator.follow(follower, Some(store.clone())).await;

        assert_eq!(vec!["a", "bb", "ccc"], drain(&mut h.lines_rx).await);
        assert_eq!(
            Some(ShutdownEvent::SourceExhausted),
            h.trigger.listener().try_event()
        );
        // saved on the way out
        assert_eq!(9, store.load(77));
    }

    #[tokio::test]
    async fn read_failure_is_a_source_error() {
        let h = harness(false);
        let mut follower = ScriptedFollower::new(&["ok"], false);
        follower
            .reads
            .push_back(Err(Error::Io(io::Error::other("disk on fire"))));

        h.coordinator.follow(follower, None).await;

        match h.trigger.listener().try_event() {
            Some(ShutdownEvent::SourceError(msg)) => assert!(msg.contains("disk on fire")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn serves_periodic_and_final_saves() {
        let mut h = harness(true);
        let store = PositionStore::new(h.dir.path().join("app.log.state"));
        let follower = ScriptedFollower::new(&["12345", "678"], true);
        let task = tokio::spawn(h.coordinator.follow(follower, Some(store.clone())));

        assert_eq!(Some(b"12345".to_vec()), h.lines_rx.next().await);
        assert_eq!(Some(b"678".to_vec()), h.lines_rx.next().await);

        h.save_tx.send(SaveRequest::Periodic).await.unwrap();
        let (ack_tx, ack_rx) = oneshot::channel();
        h.save_tx.send(SaveRequest::Final(ack_tx)).await.unwrap();

        assert_eq!(10, timeout(WAIT, ack_rx).await.unwrap().unwrap());
        assert_eq!(10, store.load(77));
        assert!(!h.trigger.is_fired());

        task.abort();
    }

    #[tokio::test]
    async fn missing_file_is_a_source_error() {
        let h = harness(true);
        h.coordinator.run().await.unwrap();

        match h.trigger.listener().try_event() {
            Some(ShutdownEvent::SourceError(msg)) => assert!(msg.contains("app.log")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_shot_reads_whole_file_without_state() {
        let mut h = harness(false);
        std::fs::write(h.dir.path().join("app.log"), b"x\ny\n").unwrap();
        // ignored in one-shot mode
        let state = h.dir.path().join("app.log.state");
        std::fs::write(&state, b"Offset 2 Time 0 Inode 1\n").unwrap();

        h.coordinator.run().await.unwrap();

        assert_eq!(vec!["x", "y"], drain(&mut h.lines_rx).await);
        assert_eq!(
            Some(ShutdownEvent::SourceExhausted),
            h.trigger.listener().try_event()
        );
        assert_eq!(
            "Offset 2 Time 0 Inode 1\n",
            std::fs::read_to_string(&state).unwrap()
        );
    }

    #[tokio::test]
    async fn resumes_from_saved_position() {
        let mut h = harness(true);
        let path = h.dir.path().join("app.log");
        std::fs::write(&path, b"seen\nfresh\n").unwrap();
        let inode = FileId::from_path(&path).unwrap().ino();
        std::fs::write(
            h.dir.path().join("app.log.state"),
            format!("Offset 5 Time 0 Inode {}\n", inode),
        )
        .unwrap();

        let task = tokio::spawn(h.coordinator.run());
        assert_eq!(
            Some(b"fresh".to_vec()),
            timeout(WAIT, h.lines_rx.next()).await.unwrap()
        );

        task.abort();
    }

    #[tokio::test]
    async fn save_timer_ticks_until_closed() {
        let (save_tx, mut save_rx) = bounded(1);
        let timer = tokio::spawn(run_save_timer(Duration::from_millis(20), save_tx));

        for _ in 0..3 {
            let request = timeout(WAIT, save_rx.next()).await.unwrap();
            assert!(matches!(request, Some(SaveRequest::Periodic)));
        }

        drop(save_rx);
        timeout(WAIT, timer).await.unwrap().unwrap();
    }
}
