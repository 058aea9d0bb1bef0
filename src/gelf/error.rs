// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Reasons a line is rejected before it becomes an envelope.
#[derive(Error, Debug)]
pub enum Error {
    #[error("line is empty after trimming")]
    EmptyLine,

    #[error("cannot parse structured line: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("JSON value is not an object")]
    NotAnObject,
}

pub type Result<T> = std::result::Result<T, Error>;
