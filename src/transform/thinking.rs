//! Thinking configuration mapping.
//!
//! One function, [`resolve_thinking`], turns the caller's request into exactly one
//! upstream representation. A `ThinkingMode` is either a level or a budget, so the two
//! keys can never be emitted together.

use crate::config::ThinkingRepresentation;
use crate::types::{ThinkingEffort, ThinkingRequest};
use serde_json::{json, Value};

/// Upstream "let the model decide" budget.
pub const AUTO_BUDGET: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingMode {
    Level(&'static str),
    Budget(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingConfig {
    pub mode: ThinkingMode,
    pub include_thoughts: bool,
}

pub fn map_effort_level(effort: ThinkingEffort) -> &'static str {
    match effort {
        ThinkingEffort::Minimal | ThinkingEffort::None => "minimal",
        ThinkingEffort::Low => "low",
        ThinkingEffort::Medium => "medium",
        ThinkingEffort::High | ThinkingEffort::XHigh => "high",
    }
}

/// Coarse level for a budget-only request sent to a level target.
pub fn level_from_budget(budget: i64) -> &'static str {
    match budget {
        b if b < 0 => "high",
        0 => "minimal",
        1..=1024 => "low",
        1025..=8192 => "medium",
        _ => "high",
    }
}

/// `None` when the caller did not ask for thinking at all.
pub fn resolve_thinking(
    request: Option<&ThinkingRequest>,
    representation: ThinkingRepresentation,
) -> Option<ThinkingConfig> {
    let request = request?;
    let disabled = request.is_disabled();
    let mode = match representation {
        ThinkingRepresentation::Level => {
            let level = match (request.effort, request.budget_tokens) {
                (Some(effort), _) => map_effort_level(effort),
                (None, Some(budget)) => level_from_budget(budget),
                (None, None) => "high",
            };
            ThinkingMode::Level(level)
        }
        ThinkingRepresentation::Budget => {
            if disabled {
                ThinkingMode::Budget(0)
            } else {
                ThinkingMode::Budget(request.budget_tokens.unwrap_or(AUTO_BUDGET))
            }
        }
    };
    Some(ThinkingConfig {
        mode,
        include_thoughts: !disabled,
    })
}

impl ThinkingConfig {
    /// Gemini `generationConfig.thinkingConfig` object.
    pub fn to_gemini(&self) -> Value {
        match self.mode {
            ThinkingMode::Level(level) => json!({
                "thinkingLevel": level,
                "includeThoughts": self.include_thoughts,
            }),
            ThinkingMode::Budget(budget) => json!({
                "thinkingBudget": budget,
                "includeThoughts": self.include_thoughts,
            }),
        }
    }

    pub fn describe(&self) -> String {
        match self.mode {
            ThinkingMode::Level(level) => format!("level:{}", level),
            ThinkingMode::Budget(budget) => format!("budget:{}", budget),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ThinkingRepresentation::{Budget, Level};

    fn mode(req: ThinkingRequest, repr: ThinkingRepresentation) -> ThinkingMode {
        resolve_thinking(Some(&req), repr).unwrap().mode
    }

    #[test]
    fn effort_levels_collapse_to_upstream_levels() {
        let level = |effort| mode(ThinkingRequest::effort(effort), Level);
        assert_eq!(level(ThinkingEffort::XHigh), ThinkingMode::Level("high"));
        assert_eq!(level(ThinkingEffort::None), ThinkingMode::Level("minimal"));
        assert_eq!(level(ThinkingEffort::Medium), ThinkingMode::Level("medium"));
        assert_eq!(mode(ThinkingRequest::budget(4000), Level), ThinkingMode::Level("medium"));
    }

    #[test]
    fn budget_representation_rules() {
        assert_eq!(mode(ThinkingRequest::disabled(), Budget), ThinkingMode::Budget(0));
        assert_eq!(mode(ThinkingRequest::budget(2048), Budget), ThinkingMode::Budget(2048));
        assert_eq!(
            mode(ThinkingRequest::effort(ThinkingEffort::High), Budget),
            ThinkingMode::Budget(AUTO_BUDGET)
        );
        assert_eq!(mode(ThinkingRequest::default(), Budget), ThinkingMode::Budget(AUTO_BUDGET));
    }

    #[test]
    fn representations_are_mutually_exclusive() {
        let req = ThinkingRequest {
            effort: Some(ThinkingEffort::Low),
            budget_tokens: Some(512),
        };
        let level = resolve_thinking(Some(&req), Level).unwrap().to_gemini();
        assert!(level.get("thinkingLevel").is_some());
        assert!(level.get("thinkingBudget").is_none());

        let budget = resolve_thinking(Some(&req), Budget).unwrap().to_gemini();
        assert_eq!(budget["thinkingBudget"], 512);
        assert!(budget.get("thinkingLevel").is_none());
    }

    #[test]
    fn absent_request_emits_nothing_and_disabled_hides_thoughts() {
        assert!(resolve_thinking(None, Budget).is_none());
        let disabled = resolve_thinking(Some(&ThinkingRequest::disabled()), Budget).unwrap();
        assert!(!disabled.include_thoughts);
    }
}
