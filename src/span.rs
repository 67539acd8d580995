//! A validated, ordered set of positive integers bounded to `1..=100`, used
//! to select subsets of leaderboard rows (`"1-3,6,2-4"` style strings).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The largest value a [`Span`] may contain.
pub const SPAN_MAX: u32 = 100;

/// A set of integers in `1..=100`, parsed from a comma-separated list of
/// single numbers and inclusive ranges (e.g. `"1-3,6,2-4"` → `{1,2,3,4,6}`).
///
/// Backed by a [`BTreeSet`] so iteration is always in ascending order; that
/// ordering isn't required by the grammar, it's just a convenient side
/// effect of the container chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Span(BTreeSet<u32>);

impl Span {
    /// Builds a span directly from a set of values, validating bounds.
    pub fn new(values: impl IntoIterator<Item = u32>) -> Result<Span, SpanError> {
        let set: BTreeSet<u32> = values.into_iter().collect();
        for &v in &set {
            if v < 1 || v > SPAN_MAX {
                return Err(SpanError::OutOfRange(v));
            }
        }
        Ok(Span(set))
    }

    /// Whether `value` is a member of this span.
    pub fn contains(&self, value: u32) -> bool {
        self.0.contains(&value)
    }

    /// Iterates the span's values in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.0.iter()
    }

    /// Number of distinct values in the span.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the span contains no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Span {
    type Err = SpanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut values = BTreeSet::new();
        for part in s.split(',') {
            if let Some((lo, hi)) = part.split_once('-') {
                let lo: u32 = lo
                    .parse()
                    .map_err(|_| SpanError::Malformed(part.to_string()))?;
                let hi: u32 = hi
                    .parse()
                    .map_err(|_| SpanError::Malformed(part.to_string()))?;
                for v in lo..=hi {
                    values.insert(v);
                }
            } else {
                let v: u32 = part
                    .parse()
                    .map_err(|_| SpanError::Malformed(part.to_string()))?;
                values.insert(v);
            }
        }
        Span::new(values)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl IntoIterator for Span {
    type Item = u32;
    type IntoIter = std::collections::btree_set::IntoIter<u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Error parsing or constructing a [`Span`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpanError {
    /// A span element isn't a valid integer or range.
    #[error("malformed span element {0:?}")]
    Malformed(String),
    /// A span element fell outside `1..=100`.
    #[error("span elements must be between 1 and 100 inclusive, got {0}")]
    OutOfRange(u32),
}
