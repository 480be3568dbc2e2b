mod rules;

pub use rules::{Matcher, Rule, DEFAULT_RULES};

use anyhow::{Context, Result};
use chrono::Utc;
use regex::{Regex, RegexBuilder};

use crate::models::{DetectedIssue, ExtractedContent};

const CONTEXT_LINES: usize = 1;
const MAX_SNIPPET_CHARS: usize = 240;

enum CompiledMatcher {
    Literal(String),
    Pattern(Regex),
}

impl CompiledMatcher {
    /// `lowered` is `line` in lower case; literals match against it.
    fn matches(&self, line: &str, lowered: &str) -> bool {
        match self {
            CompiledMatcher::Literal(needle) => lowered.contains(needle.as_str()),
            CompiledMatcher::Pattern(regex) => regex.is_match(line),
        }
    }
}

struct CompiledRule {
    keyword: &'static str,
    hint: &'static str,
    matcher: CompiledMatcher,
}

/// Scans extracted text against a fixed rule table.
///
/// Matching is case-insensitive and line by line. Each rule reports at most
/// once per scan, at its first matching line.
pub struct IssueDetector {
    rules: Vec<CompiledRule>,
}

impl IssueDetector {
    pub fn new(rules: &[Rule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<CompiledRule> {
                let matcher = match rule.matcher {
                    Matcher::Literal(text) => CompiledMatcher::Literal(text.to_lowercase()),
                    Matcher::Pattern(pattern) => CompiledMatcher::Pattern(
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .with_context(|| format!("invalid pattern for rule '{}'", rule.keyword))?,
                    ),
                };
                Ok(CompiledRule {
                    keyword: rule.keyword,
                    hint: rule.hint,
                    matcher,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn with_default_rules() -> Result<Self> {
        Self::new(DEFAULT_RULES)
    }

    pub fn detect(&self, content: &ExtractedContent) -> Vec<DetectedIssue> {
        if content.text.trim().is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = content.text.lines().collect();
        let lowered: Vec<String> = lines.iter().map(|line| line.to_lowercase()).collect();
        let detected_at = Utc::now();

        self.rules
            .iter()
            .filter_map(|rule| {
                let index = lines
                    .iter()
                    .zip(lowered.iter())
                    .position(|(line, low)| rule.matcher.matches(line, low))?;
                Some(DetectedIssue {
                    monitor_id: content.monitor_id,
                    keyword: rule.keyword.to_string(),
                    context_snippet: snippet(&lines, index),
                    suggested_hint: rule.hint.to_string(),
                    detected_at,
                })
            })
            .collect()
    }
}

/// The matching line with one line of context either side, capped in length.
fn snippet(lines: &[&str], index: usize) -> String {
    let start = index.saturating_sub(CONTEXT_LINES);
    let end = (index + CONTEXT_LINES + 1).min(lines.len());
    let joined = lines[start..end].join("\n");
    if joined.chars().count() <= MAX_SNIPPET_CHARS {
        return joined;
    }
    let mut cut: String = joined.chars().take(MAX_SNIPPET_CHARS - 3).collect();
    cut.push_str("...");
    cut
}
