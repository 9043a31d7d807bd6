//! # Digit Formatting
//!
//! Each slot of a counter template declares what it shows through class
//! markers:
//!
//! - a **unit** marker, one of `day`, `hrs`, `min`, `sec`
//! - an optional **position** marker `charN` (N ≥ 1), the N-th digit counted
//!   from the least-significant end of the unit's decimal text
//!
//! ```text
//! <span class="digit min char2">   tens of minutes
//! <span class="digit min char1">   units of minutes
//! <span class="digit day">         whole number of days
//! ```
//!
//! Digits beyond the length of the number render as `"0"`, which is how the
//! fixed-width `DD:HH:MM:SS` layouts get their leading zeros.

use std::fmt;
use std::num::NonZeroU32;

use crate::Offset;

/// Which field of the [`Offset`] a slot displays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unit {
    Day,
    Hrs,
    Min,
    Sec,
}

impl Unit {
    /// Parse a single class token.
    pub fn from_marker(token: &str) -> Option<Self> {
        match token {
            "day" => Some(Unit::Day),
            "hrs" => Some(Unit::Hrs),
            "min" => Some(Unit::Min),
            "sec" => Some(Unit::Sec),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Unit::Day => "day",
            Unit::Hrs => "hrs",
            Unit::Min => "min",
            Unit::Sec => "sec",
        }
    }

    /// The magnitude this unit picks out of an offset.
    pub fn value(self, offset: &Offset) -> u64 {
        match self {
            Unit::Day => offset.days,
            Unit::Hrs => offset.hours,
            Unit::Min => offset.minutes,
            Unit::Sec => offset.seconds,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// The markers of one slot, parsed once when the slot is discovered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotMarkers {
    pub unit: Option<Unit>,
    pub position: Option<NonZeroU32>,
}

impl SlotMarkers {
    /// Parse the whitespace-separated class list of a node.
    ///
    /// The first unit token and the first valid `charN` token win. `char0`,
    /// `char` and `charX` are not position markers.
    ///
    /// ```
    /// use counter_clock_lib::digits::{SlotMarkers, Unit};
    ///
    /// let markers = SlotMarkers::parse("digit hrs char1 sep dot");
    /// assert_eq!(markers.unit, Some(Unit::Hrs));
    /// assert_eq!(markers.position.map(|p| p.get()), Some(1));
    /// ```
    pub fn parse(class_name: &str) -> Self {
        let mut markers = SlotMarkers::default();
        for token in class_name.split_whitespace() {
            if markers.unit.is_none() {
                if let Some(unit) = Unit::from_marker(token) {
                    markers.unit = Some(unit);
                    continue;
                }
            }
            if markers.position.is_none() {
                markers.position = parse_position(token);
            }
        }
        markers
    }
}

fn parse_position(token: &str) -> Option<NonZeroU32> {
    let digits = token.strip_prefix("char")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().and_then(NonZeroU32::new)
}

/// The text a slot should show for `offset`, or `None` when the slot has no
/// unit marker and must be left untouched.
///
/// ```
/// use counter_clock_lib::digits::{render, SlotMarkers};
/// use counter_clock_lib::Offset;
///
/// let offset = Offset { signed_seconds: 45, seconds: 45, ..Offset::default() };
/// assert_eq!(render(&offset, &SlotMarkers::parse("sec")).as_deref(), Some("45"));
/// assert_eq!(render(&offset, &SlotMarkers::parse("sec char2")).as_deref(), Some("4"));
/// ```
pub fn render(offset: &Offset, markers: &SlotMarkers) -> Option<String> {
    let unit = markers.unit?;
    let text = unit.value(offset).to_string();

    let Some(position) = markers.position else {
        return Some(text);
    };

    let n = position.get() as usize;
    if n <= text.len() {
        // decimal text is ASCII, byte indexing is safe
        let at = text.len() - n;
        Some(text[at..=at].to_string())
    } else {
        Some("0".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(value: u64) -> Offset {
        Offset {
            signed_seconds: value as i64,
            seconds: value,
            ..Offset::default()
        }
    }

    #[test]
    fn test_whole_number_without_position() {
        assert_eq!(render(&seconds(45), &SlotMarkers::parse("sec")), Some("45".into()));
        assert_eq!(render(&seconds(0), &SlotMarkers::parse("sec")), Some("0".into()));
    }

    #[test]
    fn test_positions_count_from_least_significant_digit() {
        let offset = seconds(45);
        assert_eq!(render(&offset, &SlotMarkers::parse("sec char1")), Some("5".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("sec char2")), Some("4".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("sec char3")), Some("0".into()));
    }

    #[test]
    fn test_each_unit_reads_its_field() {
        let offset = Offset {
            signed_seconds: -1,
            days: 123,
            hours: 7,
            minutes: 30,
            seconds: 9,
        };
        assert_eq!(render(&offset, &SlotMarkers::parse("day")), Some("123".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("day char3")), Some("1".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("hrs char2")), Some("0".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("min char2")), Some("3".into()));
        assert_eq!(render(&offset, &SlotMarkers::parse("sec")), Some("9".into()));
    }

    #[test]
    fn test_sign_is_never_rendered() {
        let offset = Offset {
            signed_seconds: -45,
            seconds: 45,
            ..Offset::default()
        };
        assert_eq!(render(&offset, &SlotMarkers::parse("sec")), Some("45".into()));
    }

    #[test]
    fn test_no_unit_leaves_slot_untouched() {
        assert_eq!(render(&seconds(45), &SlotMarkers::parse("digit char1")), None);
        assert_eq!(render(&seconds(45), &SlotMarkers::parse("")), None);
    }

    #[test]
    fn test_marker_parsing() {
        let markers = SlotMarkers::parse("  digit day  char3 ");
        assert_eq!(markers.unit, Some(Unit::Day));
        assert_eq!(markers.position, NonZeroU32::new(3));

        // tokens must match whole words
        assert_eq!(SlotMarkers::parse("days seconds").unit, None);
        assert_eq!(SlotMarkers::parse("sec-x").unit, None);

        // first unit wins
        assert_eq!(SlotMarkers::parse("min sec").unit, Some(Unit::Min));

        assert_eq!(SlotMarkers::parse("char0").position, None);
        assert_eq!(SlotMarkers::parse("char").position, None);
        assert_eq!(SlotMarkers::parse("char1a").position, None);
        assert_eq!(SlotMarkers::parse("char12").position, NonZeroU32::new(12));
    }
}
