// SPDX-License-Identifier: Apache-2.0

//! Turning raw log lines into GELF envelopes.
//!
//! Every line first goes through [`escape::repair`], then [`builder::build`]
//! decides between the structured (JSON object) and plain text paths.

pub mod builder;
pub mod envelope;
pub mod error;
pub mod escape;
pub mod severity;

pub use builder::build;
pub use envelope::Envelope;
pub use error::{Error, Result};
