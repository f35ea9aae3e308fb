//! Fields a front end renders for editing
//!
//! Every key of the bounded stats section plus a fixed set of plain fields,
//! each shown only if the profile actually contains it.

use serde::Serialize;

use crate::config::profile::Profile;
use crate::constants::limits::{BASE_MAX, OVERDRIVE_MAX};
use crate::constants::schema::{BOUNDED_SECTION, PLAIN_FIELDS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub section: String,
    pub key: String,
    pub value: String,
    /// Subject to the overdrive ceiling on commit
    pub bounded: bool,
}

impl FieldView {
    fn new(section: &str, key: &str, value: &str) -> Self {
        Self {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            bounded: is_bounded(section),
        }
    }
}

pub fn is_bounded(section: &str) -> bool {
    section == BOUNDED_SECTION
}

/// Bounded stats first, then the plain fields in their fixed order
pub fn known_fields(profile: &Profile) -> Vec<FieldView> {
    let stats = profile
        .section(BOUNDED_SECTION)
        .into_iter()
        .flat_map(|section| section.iter())
        .map(|(key, value)| FieldView::new(BOUNDED_SECTION, key, value));

    let plain = PLAIN_FIELDS.iter().filter_map(|&(section, key)| {
        profile
            .get(section, key)
            .map(|value| FieldView::new(section, key, value))
    });

    stats.chain(plain).collect()
}

/// Every field in the profile, in discovery order
pub fn all_fields(profile: &Profile) -> Vec<FieldView> {
    profile
        .iter()
        .map(|(section, key, value)| FieldView::new(section, key, value))
        .collect()
}

/// Hint shown next to bounded stats
pub fn bounded_hint() -> String {
    format!(
        "Base Max: {}\nOverdrive Max: {}\nAllowed up to Overdrive Max.",
        group_thousands(BASE_MAX),
        group_thousands(OVERDRIVE_MAX)
    )
}

/// Format with one decimal and comma-grouped integer digits
fn group_thousands(value: f64) -> String {
    let formatted = format!("{value:.1}");
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "0"));
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}{grouped}.{frac_part}")
}
