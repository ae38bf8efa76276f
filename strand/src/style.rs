//!
//! Execution styles
//!
//! A style decides how the branches of a merge or bind are evaluated:
//!
//! - `Serial` - first branch to completion, then the next (single thread)
//! - `Interleaved` - one element per branch in turn (single thread)
//! - `Async` - demand-driven workers, output in completion order
//! - `Parallel` - one eager worker per branch, output in arrival order
//!

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Serial,
    Interleaved,
    Async,
    Parallel,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Serial, Style::Interleaved, Style::Async, Style::Parallel];

    /// Whether this style crosses into the scheduler and spawns workers.
    pub fn is_concurrent(self) -> bool {
        matches!(self, Style::Async | Style::Parallel)
    }

    pub fn name(self) -> &'static str {
        match self {
            Style::Serial => "serial",
            Style::Interleaved => "interleaved",
            Style::Async => "async",
            Style::Parallel => "parallel",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown style '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_parse_round_trip() {
        for style in Style::ALL {
            assert_eq!(style.name().parse::<Style>(), Ok(style));
        }
        assert_eq!("PARALLEL".parse::<Style>(), Ok(Style::Parallel));
        assert!("eager".parse::<Style>().is_err());
    }

    #[test]
    fn test_only_async_and_parallel_are_concurrent() {
        assert!(!Style::Serial.is_concurrent());
        assert!(!Style::Interleaved.is_concurrent());
        assert!(Style::Async.is_concurrent());
        assert!(Style::Parallel.is_concurrent());
        assert_eq!(Style::default(), Style::Serial);
    }
}
