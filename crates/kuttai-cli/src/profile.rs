//! The user's profile, persisted as pretty JSON at `<data_dir>/userdata.json`.

use kuttai_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub interests: String,
    #[serde(default = "yes")]
    pub first_time: bool,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            semester: String::new(),
            branch: String::new(),
            interests: String::new(),
            first_time: true,
        }
    }
}

impl UserProfile {
    /// `(label, value)` for each editable field, in prompt order.
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("Name", self.name.as_str()),
            ("Semester", self.semester.as_str()),
            ("Branch", self.branch.as_str()),
            ("Interests", self.interests.as_str()),
        ]
    }

    /// Apply edited values in [`UserProfile::fields`] order. Blank answers keep the current value.
    pub fn apply_edits(&mut self, answers: [String; 4]) {
        let [name, semester, branch, interests] = answers;
        for (slot, answer) in [
            (&mut self.name, name),
            (&mut self.semester, semester),
            (&mut self.branch, branch),
            (&mut self.interests, interests),
        ] {
            let answer = answer.trim();
            if !answer.is_empty() {
                *slot = answer.to_string();
            }
        }
    }
}

/// `value`, or `placeholder` when blank.
pub fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn try_load(&self) -> Result<Option<UserProfile>> {
        let txt = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Profile(format!("{}: {e}", self.path.display()))),
        };
        serde_json::from_str(&txt)
            .map(Some)
            .map_err(|e| Error::Profile(format!("{}: {e}", self.path.display())))
    }

    /// Load, falling back to a fresh profile on any error.
    pub fn load(&self) -> UserProfile {
        match self.try_load() {
            Ok(Some(p)) => p,
            Ok(None) => UserProfile::default(),
            Err(e) => {
                warn!(error = %e, "could not load profile, starting fresh");
                UserProfile::default()
            }
        }
    }

    pub fn save(&self, profile: &UserProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Profile(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| Error::Profile(e.to_string()))?;
        std::fs::write(&self.path, json)
            .map_err(|e| Error::Profile(format!("{}: {e}", self.path.display())))
    }
}
