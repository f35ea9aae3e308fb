//! Sectioned key-value profile store
//!
//! In-memory form of the game profile INI file. Sections and keys keep the
//! order they were discovered in, so front ends render them stably.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Keys to values within one section
pub type Section = IndexMap<String, String>;

/// Address of a single value in a profile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub section: String,
    pub key: String,
}

impl FieldRef {
    pub fn new(section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.section, self.key)
    }
}

/// Whole profile: section name to section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    sections: IndexMap<String, Section>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a profile from disk
    ///
    /// A missing file is an empty profile. Other read failures are returned.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "Profile file not found, starting empty");
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read profile from {}", path.display()));
            }
        };

        let profile = Self::parse(&contents);
        info!(path = %path.display(), sections = profile.section_count(), "Loaded profile");
        Ok(profile)
    }

    /// Parse INI text, skipping lines that do not fit the format
    pub fn parse(text: &str) -> Self {
        let mut profile = Self::new();
        let mut current: Option<String> = None;
        // Last key written, for continuation lines
        let mut last_key: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }

            // Indented lines continue the previous value, even if they look
            // like comments or headers, so written values read back intact
            let indented = raw.starts_with(|c: char| c.is_whitespace());
            if indented {
                if let (Some(section), Some(key)) = (&current, &last_key) {
                    if let Some(value) = profile
                        .sections
                        .get_mut(section)
                        .and_then(|s| s.get_mut(key))
                    {
                        if !value.is_empty() {
                            value.push('\n');
                        }
                        value.push_str(trimmed);
                        continue;
                    }
                }
            }

            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // `[name]` with anything after the closing bracket ignored
            if let Some((name, _)) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.split_once(']'))
            {
                let name = name.trim();
                last_key = None;
                if name.is_empty() {
                    warn!(line = line_no, content = %trimmed, "Skipping section header without a name");
                    current = None;
                    continue;
                }
                profile.sections.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                continue;
            }

            let Some(section) = &current else {
                warn!(line = line_no, content = %trimmed, "Skipping entry outside a section");
                continue;
            };

            let Some(split) = trimmed.find(['=', ':']) else {
                warn!(line = line_no, content = %trimmed, "Skipping line without key/value delimiter");
                last_key = None;
                continue;
            };

            let key = trimmed[..split].trim();
            let value = trimmed[split + 1..].trim();
            let section = section.clone();
            if let Err(err) = profile.set(&section, key, value) {
                warn!(line = line_no, error = %err, "Skipping entry");
                last_key = None;
                continue;
            }
            last_key = Some(key.to_string());
        }

        profile
    }

    /// Serialize back to INI text
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        for (name, section) in &self.sections {
            out.push('[');
            out.push_str(name);
            out.push_str("]\n");
            for (key, value) in section {
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&value.replace('\n', "\n\t"));
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// Write a field, creating the section if it does not exist yet
    ///
    /// Rejects addresses the INI form cannot carry. The value is stored the
    /// way a reload would see it: each line trimmed, blank lines dropped.
    pub fn set(&mut self, section: &str, key: &str, value: impl AsRef<str>) -> Result<()> {
        check_field(section, key)?;
        let value = stored_value(value.as_ref());
        debug!(section = %section, key = %key, value = %value, "Setting profile field");
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.get_mut(name)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Every (section, key, value) in discovery order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> + Clone {
        self.sections.iter().flat_map(|(name, section)| {
            section
                .iter()
                .map(move |(key, value)| (name.as_str(), key.as_str(), value.as_str()))
        })
    }
}

/// Check that `section`/`key` can be written and read back unchanged
pub fn check_field(section: &str, key: &str) -> Result<()> {
    if section.is_empty() || section != section.trim() {
        bail!("invalid section name {section:?}: empty or padded with whitespace");
    }
    if section.contains([']', '\n', '\r']) {
        bail!("invalid section name {section:?}: contains ']' or a line break");
    }
    if key.is_empty() || key != key.trim() {
        bail!("invalid key {key:?} in [{section}]: empty or padded with whitespace");
    }
    if key.contains(['=', ':', '\n', '\r']) {
        bail!("invalid key {key:?} in [{section}]: contains '=', ':' or a line break");
    }
    if key.starts_with(['#', ';', '[']) {
        bail!("invalid key {key:?} in [{section}]: starts with '#', ';' or '['");
    }
    Ok(())
}

fn stored_value(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
