use crate::runner::orchestrator::PhaseOutcome;
use crate::runner::recorder::StatusCounts;
use crate::runner::state::{Category, TestResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative verdict derived from the pass rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Grade {
    Excellent,
    Good,
    Acceptable,
    Critical,
}

impl Grade {
    /// ≥95 excellent, ≥85 good, ≥70 acceptable, else critical
    pub fn from_pass_rate(pass_rate: f64) -> Self {
        if pass_rate >= 95.0 {
            Grade::Excellent
        } else if pass_rate >= 85.0 {
            Grade::Good
        } else if pass_rate >= 70.0 {
            Grade::Acceptable
        } else {
            Grade::Critical
        }
    }

    /// Process exit status for this grade
    pub fn exit_code(&self) -> i32 {
        match self {
            Grade::Excellent | Grade::Good => 0,
            Grade::Acceptable => 1,
            Grade::Critical => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Excellent => "EXCELLENT",
            Grade::Good => "GOOD",
            Grade::Acceptable => "ACCEPTABLE",
            Grade::Critical => "CRITICAL",
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            Grade::Excellent => "EXCELLENT: Platform is enterprise-ready",
            Grade::Good => "GOOD: Platform is production-ready with minor issues",
            Grade::Acceptable => "ACCEPTABLE: Platform needs improvements before production",
            Grade::Critical => "CRITICAL: Platform has significant issues blocking production",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category counts and pass rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: Category,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub pass_rate: f64,
}

/// A FAIL or ERROR row, listed for quick triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureEntry {
    pub name: String,
    pub category: Category,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Canonical record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: String,
    pub interrupted: bool,
    pub duration_ms: u64,

    pub total_tests: u32,
    #[serde(flatten)]
    pub totals: StatusCounts,
    pub pass_rate: f64,
    pub grade: Grade,

    pub categories: Vec<CategoryBreakdown>,
    pub phases: Vec<PhaseOutcome>,
    pub failures: Vec<FailureEntry>,
    pub results: Vec<TestResult>,
}

impl RunReport {
    /// Exit status for the process: 130 when interrupted, otherwise the grade's
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            130
        } else {
            self.grade.exit_code()
        }
    }
}
