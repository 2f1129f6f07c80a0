//! Inbound job posted to an isolation unit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SandboxError;

/// Logical language tag of a job.
///
/// Only the scripting language is executed here. Markup and stylesheet
/// previews are rendered by the embedding application.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    #[serde(alias = "js")]
    Javascript,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Javascript => f.write_str("javascript"),
        }
    }
}

impl FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::Javascript),
            other => Err(SandboxError::unsupported(other)),
        }
    }
}

/// Source text plus language tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub source: String,
    #[serde(default)]
    pub language: Language,
}

impl Job {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: Language::default(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }
}

impl From<&str> for Job {
    fn from(source: &str) -> Self {
        Job::new(source)
    }
}

impl From<String> for Job {
    fn from(source: String) -> Self {
        Job::new(source)
    }
}
