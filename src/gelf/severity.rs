// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

/// Syslog severity as carried in the GELF `level` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum SyslogLevel {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    #[default]
    Informational = 6,
    Debug = 7,
}

impl SyslogLevel {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for SyslogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Emergency => "emerg",
            Self::Alert => "alert",
            Self::Critical => "crit",
            Self::Error => "error",
            Self::Warning => "warn",
            Self::Notice => "notice",
            Self::Informational => "info",
            Self::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

/// Names are matched exactly; `WARN` or ` warn` are not levels.
impl FromStr for SyslogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emerg" => Ok(Self::Emergency),
            "alert" => Ok(Self::Alert),
            "crit" | "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warning),
            "notice" => Ok(Self::Notice),
            "info" => Ok(Self::Informational),
            "debug" => Ok(Self::Debug),
            _ => Err(format!("unknown severity name: {}", s)),
        }
    }
}

impl TryFrom<i64> for SyslogLevel {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, <Self as TryFrom<i64>>::Error> {
        match value {
            0 => Ok(Self::Emergency),
            1 => Ok(Self::Alert),
            2 => Ok(Self::Critical),
            3 => Ok(Self::Error),
            4 => Ok(Self::Warning),
            5 => Ok(Self::Notice),
            6 => Ok(Self::Informational),
            7 => Ok(Self::Debug),
            _ => Err(format!("severity out of range: {}", value)),
        }
    }
}
