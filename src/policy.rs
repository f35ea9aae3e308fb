//! Value policy for bounded badass rank stats
//!
//! Stats may exceed the in-game maximum up to the overdrive ceiling. Anything
//! that does not parse as a number is left alone so a typo never blocks a save.

use tracing::{debug, warn};

use crate::config::profile::{FieldRef, Profile};
use crate::constants::limits::OVERDRIVE_MAX;
use crate::constants::schema::BOUNDED_SECTION;

/// Clamp a single bounded value to `OVERDRIVE_MAX`
///
/// Returns the input unchanged if it is not a number. Numbers come back in
/// canonical form, so applying this twice yields the same string.
pub fn normalize_bounded(value: &str) -> String {
    match parse_number(value) {
        // NaN compares false and passes through
        Some(parsed) if parsed > OVERDRIVE_MAX => format_canonical(OVERDRIVE_MAX),
        Some(parsed) => format_canonical(parsed),
        None => value.to_string(),
    }
}

/// Parse a stat as a float, accepting `_` digit grouping (`1_000_000`)
///
/// An underscore counts only between two digits; anything else is not a
/// number.
fn parse_number(value: &str) -> Option<f64> {
    let text = value.trim();
    if !text.contains('_') {
        return text.parse().ok();
    }
    let bytes = text.as_bytes();
    let grouped = bytes.iter().enumerate().all(|(i, &b)| {
        b != b'_'
            || (i > 0
                && bytes[i - 1].is_ascii_digit()
                && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    });
    if !grouped {
        return None;
    }
    text.replace('_', "").parse().ok()
}

/// Render a float the way the profile stores it
///
/// Integral values keep a trailing `.0`; very large and very small
/// magnitudes switch to exponent form.
pub fn format_canonical(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // Debug gives the shortest round-trip repr and already appends ".0"
    format!("{value:?}")
}

/// Outcome of running the policy over a whole profile
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PolicyReport {
    /// Fields whose numeric value was reduced to the ceiling
    pub clamped: Vec<FieldRef>,
    /// Fields left untouched because they are not numbers
    pub skipped: Vec<FieldRef>,
}

impl PolicyReport {
    pub fn is_clean(&self) -> bool {
        self.clamped.is_empty() && self.skipped.is_empty()
    }
}

/// Normalize every key of the bounded section in place
///
/// Fields outside the bounded section are never touched.
pub fn normalize_profile(profile: &mut Profile) -> PolicyReport {
    let mut report = PolicyReport::default();
    let Some(section) = profile.section_mut(BOUNDED_SECTION) else {
        return report;
    };

    for (key, value) in section.iter_mut() {
        let field = FieldRef::new(BOUNDED_SECTION, key.as_str());
        match parse_number(value) {
            Some(parsed) => {
                if parsed > OVERDRIVE_MAX {
                    warn!(field = %field, value = %value, max = OVERDRIVE_MAX, "stat exceeds overdrive maximum, clamping");
                    report.clamped.push(field);
                }
                *value = normalize_bounded(value);
            }
            None => {
                debug!(field = %field, value = %value, "stat is not numeric, leaving unchanged");
                report.skipped.push(field);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::limits::BASE_MAX;

    #[test]
    fn test_overdrive_is_twice_base() {
        assert_eq!(OVERDRIVE_MAX, 19_951_462.0);
        assert_eq!(OVERDRIVE_MAX, BASE_MAX * 2.0);
    }

    #[test]
    fn test_above_ceiling_clamps_to_ceiling() {
        assert_eq!(normalize_bounded("25000000"), "19951462.0");
        assert_eq!(normalize_bounded("19951462.5"), "19951462.0");
        assert_eq!(normalize_bounded("1e300"), "19951462.0");
    }

    #[test]
    fn test_at_or_below_ceiling_is_kept() {
        assert_eq!(normalize_bounded("500"), "500.0");
        assert_eq!(normalize_bounded("19951462"), "19951462.0");
        assert_eq!(normalize_bounded("19951462.0"), "19951462.0");
        assert_eq!(normalize_bounded("9975731.0"), "9975731.0");
        assert_eq!(normalize_bounded("12.25"), "12.25");
    }

    #[test]
    fn test_no_floor_clamping() {
        assert_eq!(normalize_bounded("0"), "0.0");
        assert_eq!(normalize_bounded("-42.5"), "-42.5");
        assert_eq!(normalize_bounded("-1e20"), "-1e20");
    }

    #[test]
    fn test_non_numeric_is_identity() {
        for raw in ["abc", "", "12abc", "1,000", " not a number "] {
            assert_eq!(normalize_bounded(raw), raw);
        }
    }

    #[test]
    fn test_digit_grouping_underscores() {
        assert_eq!(normalize_bounded("25_000_000"), "19951462.0");
        assert_eq!(normalize_bounded("1_000"), "1000.0");
        assert_eq!(normalize_bounded("1_0.2_5"), "10.25");
        for raw in ["_1000", "1000_", "1__000", "1_.5", "1e_5", "in_f"] {
            assert_eq!(normalize_bounded(raw), raw);
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert_eq!(normalize_bounded("  500 "), "500.0");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["500", "25000000", "0.1", "-3", "abc", "1e-7", "nan", "inf"] {
            let once = normalize_bounded(raw);
            assert_eq!(normalize_bounded(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn test_non_finite_inputs() {
        // +inf is ordered above the ceiling
        assert_eq!(normalize_bounded("inf"), "19951462.0");
        assert_eq!(normalize_bounded("-inf"), "-inf");
        // NaN is never greater than the ceiling so it survives
        assert_eq!(normalize_bounded("nan"), "nan");
        assert_eq!(normalize_bounded("NaN"), "nan");
    }

    #[test]
    fn test_format_canonical() {
        assert_eq!(format_canonical(500.0), "500.0");
        assert_eq!(format_canonical(0.1), "0.1");
        assert_eq!(format_canonical(-0.0), "-0.0");
        assert_eq!(format_canonical(1e-7), "1e-7");
    }

    #[test]
    fn test_normalize_profile_only_touches_bounded_section() {
        let mut profile = Profile::new();
        profile.set(BOUNDED_SECTION, "Badass Tokens", "25000000").expect("set");
        profile.set(BOUNDED_SECTION, "Max Health", "500").expect("set");
        profile.set(BOUNDED_SECTION, "Shield Capacity", "abc").expect("set");
        profile.set("BarTokens", "count", "25000000").expect("set");

        let report = normalize_profile(&mut profile);

        assert_eq!(profile.get(BOUNDED_SECTION, "Badass Tokens"), Some("19951462.0"));
        assert_eq!(profile.get(BOUNDED_SECTION, "Max Health"), Some("500.0"));
        assert_eq!(profile.get(BOUNDED_SECTION, "Shield Capacity"), Some("abc"));
        assert_eq!(profile.get("BarTokens", "count"), Some("25000000"));

        assert_eq!(report.clamped, vec![FieldRef::new(BOUNDED_SECTION, "Badass Tokens")]);
        assert_eq!(report.skipped, vec![FieldRef::new(BOUNDED_SECTION, "Shield Capacity")]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_normalize_profile_without_bounded_section() {
        let mut profile = Profile::new();
        profile.set("FOV", "value", "90").expect("set");
        let report = normalize_profile(&mut profile);
        assert!(report.is_clean());
        assert_eq!(profile.section_count(), 1);
    }
}
