//! Editor session: one loaded profile plus the settings to commit and sync it
//!
//! Front ends drive the engine through this type. It owns no global state,
//! so several sessions (or a headless test) can exist side by side.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::config::persistent::{commit, CommitReport};
use crate::config::profile::{check_field, FieldRef, Profile};
use crate::config::schema::{all_fields, known_fields, FieldView};
use crate::config::settings::Settings;
use crate::sync::{sync, Outcome};

/// One field edit, written on the command line as `SECTION:KEY=VALUE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub field: FieldRef,
    pub value: String,
}

impl FromStr for FieldEdit {
    type Err = anyhow::Error;

    fn from_str(spec: &str) -> Result<Self> {
        let Some((section, rest)) = spec.split_once(':') else {
            bail!("invalid field edit '{spec}': expected SECTION:KEY=VALUE");
        };
        let Some((key, value)) = rest.split_once('=') else {
            bail!("invalid field edit '{spec}': missing '=' before the value");
        };
        let (section, key) = (section.trim(), key.trim());
        check_field(section, key).with_context(|| format!("invalid field edit '{spec}'"))?;
        Ok(Self {
            field: FieldRef::new(section, key),
            value: value.trim().to_string(),
        })
    }
}

#[derive(Debug)]
pub struct EditorSession {
    settings: Settings,
    profile: Profile,
}

impl EditorSession {
    /// Load the profile named by `settings`
    pub fn open(settings: Settings) -> Result<Self> {
        let profile = Profile::load(&settings.config_path).with_context(|| {
            format!("Failed to open profile session for {}", settings.config_path.display())
        })?;
        if profile.is_empty() {
            info!(path = %settings.config_path.display(), "Starting with an empty profile");
        }
        Ok(Self { settings, profile })
    }

    pub fn config_path(&self) -> &Path {
        &self.settings.config_path
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.profile.get(section, key)
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl AsRef<str>) -> Result<()> {
        self.profile.set(section, key, value)
    }

    pub fn apply(&mut self, edits: &[FieldEdit]) -> Result<()> {
        for edit in edits {
            self.set(&edit.field.section, &edit.field.key, &edit.value)?;
        }
        Ok(())
    }

    /// Known fields, or every field when `all` is set
    pub fn fields(&self, all: bool) -> Vec<FieldView> {
        if all {
            all_fields(&self.profile)
        } else {
            known_fields(&self.profile)
        }
    }

    /// Normalize and durably write the profile
    pub fn commit(&mut self) -> Result<CommitReport> {
        commit(
            &mut self.profile,
            &self.settings.config_path,
            self.settings.write_strategy,
        )
    }

    /// Commit, then apply the committed profile onto the payload
    ///
    /// A failed commit aborts before the transformer is considered, so it
    /// never reads a stale or partial profile.
    pub fn update_payload(&mut self) -> Result<Outcome> {
        self.commit()
            .context("Profile commit failed, payload not updated")?;
        let outcome = sync(
            &self.settings.config_path,
            &self.settings.payload_path,
            &self.settings.transformer,
        )?;
        info!(outcome = ?outcome, "Payload sync finished");
        Ok(outcome)
    }
}
