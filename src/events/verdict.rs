//! Consumer verdicts about a created process.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Error, ProcessId, Result};

/// What the consumer decided about a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    /// Numeric form used by control clients (0 = allow, 1 = block).
    pub fn from_raw(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(Decision::Allow),
            1 => Ok(Decision::Block),
            _ => Err(Error::validation(format!("Invalid decision: {}", raw))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block => "block",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Decision::Allow),
            "block" => Ok(Decision::Block),
            _ => Err(Error::validation(format!("Invalid decision: {}", s))),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict submitted by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub process_id: ProcessId,
    pub decision: Decision,
}

/// Unconditional acknowledgement of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub process_id: ProcessId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_parsing() {
        assert_eq!("Block".parse::<Decision>().unwrap(), Decision::Block);
        assert_eq!(Decision::from_raw(0).unwrap(), Decision::Allow);
        assert!(Decision::from_raw(2).is_err());
        assert!("maybe".parse::<Decision>().is_err());
    }
}
