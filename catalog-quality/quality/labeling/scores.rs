use std::fmt;

use serde::{Deserialize, Serialize};

/// Weight of the text score in the composite.
pub const TEXT_WEIGHT: f64 = 0.5;
/// Weight of the price sanity score in the composite.
pub const SANITY_WEIGHT: f64 = 0.2;
/// Weight of the price/text consistency score in the composite.
pub const CONSISTENCY_WEIGHT: f64 = 0.3;
/// Composite scores at or below this value are labeled Low.
pub const LOW_CUT: f64 = 0.8;
/// Composite scores at or below this value (and above [`LOW_CUT`]) are labeled Medium.
pub const MEDIUM_CUT: f64 = 1.6;
/// Records below this share of their price bin's mean word count are inconsistent.
pub const CONSISTENCY_LOW_RATIO: f64 = 0.9;
/// Records above this share of their price bin's mean word count are richer than their bin.
pub const CONSISTENCY_HIGH_RATIO: f64 = 1.1;
/// Tukey fence multiplier.
pub const FENCE_MULTIPLIER: f64 = 1.5;
/// Requested number of equal-frequency price bins.
pub const PRICE_BIN_COUNT: usize = 5;

macro_rules! tier_score {
    ($(#[$meta:meta])* $name:ident { $low:ident, $mid:ident, $high:ident }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        pub enum $name {
            #[allow(missing_docs)]
            $low = 0,
            #[allow(missing_docs)]
            $mid = 1,
            #[allow(missing_docs)]
            $high = 2,
        }

        impl $name {
            /// Numeric score in `0..=2`.
            #[must_use]
            pub const fn value(self) -> u8 {
                self as u8
            }
        }

        impl From<$name> for u8 {
            fn from(score: $name) -> Self {
                score.value()
            }
        }

        impl TryFrom<u8> for $name {
            type Error = String;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    0 => Ok(Self::$low),
                    1 => Ok(Self::$mid),
                    2 => Ok(Self::$high),
                    other => Err(format!("{} out of range: {other}", stringify!($name))),
                }
            }
        }
    };
}

tier_score!(
    /// Word count relative to the table's quartiles.
    TextScore { Short, Typical, Detailed }
);

tier_score!(
    /// Word count relative to the mean of the record's price bin.
    ConsistencyScore { Sparse, Consistent, Rich }
);

/// Discrete weak label derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QualityLabel {
    /// Composite score `<= 0.8`.
    Low = 0,
    /// Composite score in `(0.8, 1.6]`.
    Medium = 1,
    /// Composite score `> 1.6`.
    High = 2,
}

impl QualityLabel {
    /// Every label in index order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Maps a composite score onto a label. Cut points are inclusive on the upper side.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score <= LOW_CUT {
            Self::Low
        } else if score <= MEDIUM_CUT {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Class index (`0`, `1`, `2`).
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Label for a class index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            _ => None,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Low => "Low Quality",
            Self::Medium => "Medium Quality",
            Self::High => "High Quality",
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl From<QualityLabel> for u8 {
    fn from(label: QualityLabel) -> Self {
        label.index()
    }
}

impl TryFrom<u8> for QualityLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| format!("quality label out of range: {value}"))
    }
}

/// Whitespace token count. Empty text counts zero.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Buckets a word count against the table quartiles: `< low` is short, `<= high` typical.
#[must_use]
pub fn text_score(word_count: usize, low_wc: f64, high_wc: f64) -> TextScore {
    let wc = word_count as f64;
    if wc < low_wc {
        TextScore::Short
    } else if wc <= high_wc {
        TextScore::Typical
    } else {
        TextScore::Detailed
    }
}

/// Compares a word count with its price bin mean using the +/-10% band.
#[must_use]
pub fn consistency_score(word_count: usize, bin_mean: f64) -> ConsistencyScore {
    let wc = word_count as f64;
    if wc < bin_mean * CONSISTENCY_LOW_RATIO {
        ConsistencyScore::Sparse
    } else if wc <= bin_mean * CONSISTENCY_HIGH_RATIO {
        ConsistencyScore::Consistent
    } else {
        ConsistencyScore::Rich
    }
}

/// Weighted composite in `[0.0, 2.0]`.
#[must_use]
pub fn final_score(text: TextScore, price_sanity: u8, consistency: ConsistencyScore) -> f64 {
    f64::from(text.value()) * TEXT_WEIGHT
        + f64::from(price_sanity) * SANITY_WEIGHT
        + f64::from(consistency.value()) * CONSISTENCY_WEIGHT
}
