//! Learning-domain payloads produced by AI generation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Audience experience level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    #[default]
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(format!(
                "unknown level '{}': expected beginner, intermediate or advanced",
                other
            )),
        }
    }
}

/// What a code analysis should focus on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Review,
    Debug,
    Optimize,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Review => "review",
            AnalysisMode::Debug => "debug",
            AnalysisMode::Optimize => "optimize",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review" => Ok(AnalysisMode::Review),
            "debug" => Ok(AnalysisMode::Debug),
            "optimize" => Ok(AnalysisMode::Optimize),
            other => Err(format!(
                "unknown analysis mode '{}': expected review, debug or optimize",
                other
            )),
        }
    }
}

/// Where a question was asked from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContext {
    #[serde(default)]
    pub topic: Option<String>,

    #[serde(default)]
    pub section: Option<String>,

    /// Code the learner currently has open, if any
    #[serde(default)]
    pub current_code: Option<String>,
}

/// A single multiple-choice quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
}

/// A curriculum category to be grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub name: String,

    /// Study order; lower comes first
    #[serde(default)]
    pub order: i64,

    /// Optional short key shown next to the name
    #[serde(default)]
    pub key: Option<String>,
}

/// AI-proposed group for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAssignment {
    pub group: String,

    /// 0-100
    pub confidence: f64,

    #[serde(default)]
    pub reasoning: Option<String>,
}

/// One generated test case. `input` and `expected` are free-form JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: Value,
    pub expected: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Visible and hidden test cases for a coding problem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseSet {
    #[serde(default)]
    pub sample_cases: Vec<TestCase>,
    #[serde(default)]
    pub hidden_cases: Vec<TestCase>,
}

impl TestCaseSet {
    pub fn is_empty(&self) -> bool {
        self.sample_cases.is_empty() && self.hidden_cases.is_empty()
    }
}

/// A module in a structured learning path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathModule {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub estimated_hours: f64,
}

/// An ordered learning path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub modules: Vec<PathModule>,
    #[serde(default)]
    pub total_estimated_hours: f64,
}
