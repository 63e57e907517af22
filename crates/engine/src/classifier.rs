//! Intent and urgency classification.
//!
//! A message is lower-cased and trimmed, then checked against a fixed list
//! of emergency phrases. Any hit short-circuits to [`Intent::Emergency`].
//! Otherwise the pattern groups are tried in order (diagnostics, then
//! adjust_plan, then question) and the first group with a matching pattern
//! wins. Group order matters because messages routinely match several.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Phrases that mark a message as urgent. Substring match on lower-cased text.
pub const EMERGENCY_KEYWORDS: &[&str] = &[
    "dying",
    "dead",
    "emergency",
    "urgent",
    "help me",
    "plants are dying",
    "all yellow",
    "wilting badly",
    "root rot",
    "mold everywhere",
    "pest infestation",
    "leaves falling",
    "brown spots everywhere",
    "overwatered badly",
    "underwatered dying",
    "nutrient burn severe",
    "lockout",
    "hermie",
    "hermaphrodite",
    "nanners",
    "light burn severe",
    "heat stress critical",
];

const DIAGNOSTICS_PATTERNS: &[&str] = &[
    r"\bdiagn",
    r"\banaly[sz]",
    r"\bshow\s+(?:me\s+)?(?:data|stats|chart|graph)",
    r"\bsnapshot",
    r"\breading",
];

const ADJUST_PLAN_PATTERNS: &[&str] = &[
    r"\badjust\s+plan",
    r"\bchange\s+(?:the\s+)?plan",
    r"\bmodify\s+(?:the\s+)?plan",
    r"\breschedule",
    r"\bupdate\s+(?:the\s+)?plan",
    r"\bnew\s+plan",
];

const QUESTION_PATTERNS: &[&str] = &[
    r"\bwhat\b",
    r"\bhow\b",
    r"\bwhy\b",
    r"\bwhen\b",
    r"\bshould\b",
    r"\bcan\s+i\b",
    r"\bis\s+it\b",
    r"\?$",
];

/// What the user is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Question,
    Emergency,
    AdjustPlan,
    Diagnostics,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Emergency => "emergency",
            Self::AdjustPlan => "adjust_plan",
            Self::Diagnostics => "diagnostics",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub is_emergency: bool,
}

struct PatternGroup {
    intent: Intent,
    patterns: Vec<Regex>,
}

static PATTERN_GROUPS: LazyLock<Vec<PatternGroup>> = LazyLock::new(|| {
    let compile = |sources: &[&str]| -> Vec<Regex> {
        sources.iter().filter_map(|p| Regex::new(p).ok()).collect()
    };
    vec![
        PatternGroup {
            intent: Intent::Diagnostics,
            patterns: compile(DIAGNOSTICS_PATTERNS),
        },
        PatternGroup {
            intent: Intent::AdjustPlan,
            patterns: compile(ADJUST_PLAN_PATTERNS),
        },
        PatternGroup {
            intent: Intent::Question,
            patterns: compile(QUESTION_PATTERNS),
        },
    ]
});

/// Classify a message. Pure and infallible.
pub fn classify(message: &str) -> Classification {
    let text = message.trim().to_lowercase();
    if text.is_empty() {
        return Classification {
            intent: Intent::General,
            is_emergency: false,
        };
    }

    if EMERGENCY_KEYWORDS.iter().any(|kw| text.contains(kw)) {
        return Classification {
            intent: Intent::Emergency,
            is_emergency: true,
        };
    }

    let intent = PATTERN_GROUPS
        .iter()
        .find(|group| group.patterns.iter().any(|re| re.is_match(&text)))
        .map(|group| group.intent)
        .unwrap_or(Intent::General);

    Classification {
        intent,
        is_emergency: false,
    }
}
