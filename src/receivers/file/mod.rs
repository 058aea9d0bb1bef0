// SPDX-License-Identifier: Apache-2.0

//! File receiver for following a single log file.
//!
//! The receiver reads newline-terminated lines, pushes them in order into the
//! line queue, and keeps a small position record next to the file so that a
//! restart resumes where the previous run stopped.
//!
//! Features:
//! - Inode-based identity, so rotation and truncation are detected
//! - Periodic and final position saves
//! - One-shot mode that reads to the end and stops

pub mod config;
pub mod coordinator;
pub mod error;
pub mod file_id;
pub mod follower;
pub mod position;

pub use config::FileReceiverConfig;
pub use coordinator::{SaveRequest, TailCoordinator, TailState, run_save_timer};
pub use error::{Error, Result};
pub use file_id::FileId;
pub use follower::{FileFollower, LineFollower, RawLine};
pub use position::{PositionRecord, PositionStore};
