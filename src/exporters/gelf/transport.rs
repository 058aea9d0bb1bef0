// SPDX-License-Identifier: Apache-2.0

use crate::exporters::gelf::error::Result;
use crate::gelf::Envelope;
use std::future::Future;

/// Destination for envelopes. A failed send is reported, never retried.
pub trait Transport: Send {
    fn send(&mut self, envelope: &Envelope) -> impl Future<Output = Result<()>> + Send;
}
