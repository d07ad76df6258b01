//! Model and mode selections carried with every request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A model name together with the provider serving it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub provider: String,
}

impl ModelSelection {
    pub fn new(name: &str, provider: &str) -> Self {
        Self { name: name.to_string(), provider: provider.to_string() }
    }

    pub fn is_set(&self) -> bool {
        !self.name.trim().is_empty() && !self.provider.trim().is_empty()
    }
}

/// Which retrieval strategy the server should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusMode {
    #[default]
    WebSearch,
    AcademicSearch,
    WritingAssistant,
    WolframAlphaSearch,
    YoutubeSearch,
    RedditSearch,
}

impl FocusMode {
    pub const ALL: [FocusMode; 6] = [
        FocusMode::WebSearch,
        FocusMode::AcademicSearch,
        FocusMode::WritingAssistant,
        FocusMode::WolframAlphaSearch,
        FocusMode::YoutubeSearch,
        FocusMode::RedditSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FocusMode::WebSearch => "webSearch",
            FocusMode::AcademicSearch => "academicSearch",
            FocusMode::WritingAssistant => "writingAssistant",
            FocusMode::WolframAlphaSearch => "wolframAlphaSearch",
            FocusMode::YoutubeSearch => "youtubeSearch",
            FocusMode::RedditSearch => "redditSearch",
        }
    }
}

/// Speed/quality trade-off requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptimizationMode {
    #[default]
    Speed,
    Balanced,
    Quality,
}

impl OptimizationMode {
    pub const ALL: [OptimizationMode; 3] = [OptimizationMode::Speed, OptimizationMode::Balanced, OptimizationMode::Quality];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationMode::Speed => "speed",
            OptimizationMode::Balanced => "balanced",
            OptimizationMode::Quality => "quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for FocusMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| UnknownMode(s.to_string()))
    }
}

impl FromStr for OptimizationMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|m| m.as_str().eq_ignore_ascii_case(s)).ok_or_else(|| UnknownMode(s.to_string()))
    }
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OptimizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_as_str() {
        for mode in FocusMode::ALL {
            assert_eq!(serde_json::to_value(mode).unwrap(), mode.as_str());
        }
        for mode in OptimizationMode::ALL {
            assert_eq!(serde_json::to_value(mode).unwrap(), mode.as_str());
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("academicsearch".parse::<FocusMode>(), Ok(FocusMode::AcademicSearch));
        assert_eq!("Quality".parse::<OptimizationMode>(), Ok(OptimizationMode::Quality));
        assert!("fast".parse::<OptimizationMode>().is_err());
    }

    #[test]
    fn model_selection_readiness() {
        assert!(!ModelSelection::default().is_set());
        assert!(!ModelSelection::new("gpt-4o", " ").is_set());
        assert!(ModelSelection::new("gpt-4o", "openai").is_set());
    }
}
