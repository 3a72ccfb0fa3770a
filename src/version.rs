//! Lenient dotted-version handling for toolchain and dependency floors.
//!
//! Toolchain version strings in this domain ("6.8", "33.0.2", "12.0.1-beta")
//! are not reliable semver, so comparison is numeric segment by segment with
//! missing segments reading as zero and trailing junk ignored.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedVersion {
    segments: Vec<u64>,
    raw: String,
}

impl DottedVersion {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .trim()
            .split('.')
            .map(|segment| {
                let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        Self {
            segments,
            raw: raw.trim().to_string(),
        }
    }

    pub fn major(&self) -> u64 {
        self.segments.first().copied().unwrap_or(0)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}
