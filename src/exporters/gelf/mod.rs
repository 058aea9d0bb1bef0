// SPDX-License-Identifier: Apache-2.0

//! GELF exporter.
//!
//! The [`dispatch::DispatchSink`] pulls raw lines off the line queue, turns
//! each into an envelope and hands it to a [`transport::Transport`]. The
//! production transport is [`udp::GelfUdpTransport`].

pub mod config;
pub mod dispatch;
pub mod encode;
pub mod error;
pub mod transport;
pub mod udp;

pub use config::{Compression, GelfExporterConfig};
pub use dispatch::{DispatchSink, DispatchStats};
pub use error::{Error, Result};
pub use transport::Transport;
pub use udp::GelfUdpTransport;
