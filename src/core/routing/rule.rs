//! Routing rule definitions and their compiled form.

use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveTime, Timelike, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::diagnostics::ErrorCategory;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("Rules '{first}' and '{second}' share priority {priority}")]
    DuplicatePriority {
        priority: i32,
        first: String,
        second: String,
    },

    #[error("Forward rule '{0}' has no target")]
    MissingTarget(String),

    #[error("Rule '{rule}' has an invalid time '{value}' (expected HH:MM)")]
    InvalidTime { rule: String, value: String },

    #[error("Rule '{rule}' has an invalid day of week '{value}'")]
    InvalidDay { rule: String, value: String },

    #[error("Rule '{rule}' has an invalid caller pattern: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}

impl RoutingError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

pub type RoutingResult<T> = Result<T, RoutingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteActionKind {
    /// Hand the call to another number
    Forward,
    /// Let the carrier record a voicemail
    Voicemail,
    /// Live agent conversation
    Agent,
    /// Automated conversation
    Automated,
}

impl fmt::Display for RouteActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteActionKind::Forward => "forward",
            RouteActionKind::Voicemail => "voicemail",
            RouteActionKind::Agent => "agent",
            RouteActionKind::Automated => "automated",
        };
        write!(f, "{s}")
    }
}

/// What to do with a matched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAction {
    #[serde(rename = "type")]
    pub kind: RouteActionKind,
    /// Forwarding destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Greeting spoken (agent, automated) or played (voicemail)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RouteAction {
    /// The action applied when no rule matches.
    pub fn agent() -> Self {
        Self {
            kind: RouteActionKind::Agent,
            target: None,
            message: None,
        }
    }

    /// Whether this action runs the local speech pipeline.
    pub fn starts_processing(&self) -> bool {
        matches!(
            self.kind,
            RouteActionKind::Agent | RouteActionKind::Automated
        )
    }
}

/// Inclusive start, exclusive end, `HH:MM` local to the router's offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindowSpec {
    pub start: String,
    pub end: String,
}

/// Conjunction of optional conditions. An empty set matches every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindowSpec>,
    /// Day names ("mon", "Tuesday", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<String>>,
    /// Regular expression matched against the caller number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_pattern: Option<String>,
    /// Dialed organization number, compared on digits only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_number: Option<String>,
}

/// A routing rule as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub name: String,
    /// Lower values are evaluated first
    pub priority: i32,
    #[serde(default)]
    pub conditions: RuleConditions,
    pub action: RouteAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl TimeWindow {
    /// Whether `time` falls in the window. Windows with `end < start` wrap
    /// midnight; `start == end` covers the whole day.
    pub(crate) fn contains(&self, time: NaiveTime) -> bool {
        // Minute resolution
        let minute = |t: NaiveTime| t.hour() * 60 + t.minute();
        let (s, e, t) = (minute(self.start), minute(self.end), minute(time));
        match s.cmp(&e) {
            std::cmp::Ordering::Less => s <= t && t < e,
            std::cmp::Ordering::Greater => t >= s || t < e,
            std::cmp::Ordering::Equal => true,
        }
    }
}

/// A validated rule ready for evaluation.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) rule: RoutingRule,
    window: Option<TimeWindow>,
    days: Option<HashSet<Weekday>>,
    caller: Option<Regex>,
    organization_digits: Option<String>,
}

impl CompiledRule {
    pub(crate) fn compile(rule: RoutingRule) -> RoutingResult<Self> {
        if rule.action.kind == RouteActionKind::Forward
            && rule
                .action
                .target
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err(RoutingError::MissingTarget(rule.name.clone()));
        }

        let window = match &rule.conditions.time_window {
            Some(spec) => Some(TimeWindow {
                start: parse_time(&rule.name, &spec.start)?,
                end: parse_time(&rule.name, &spec.end)?,
            }),
            None => None,
        };

        let days = match &rule.conditions.days_of_week {
            Some(names) => {
                let mut days = HashSet::new();
                for name in names {
                    let day = name
                        .trim()
                        .parse::<Weekday>()
                        .map_err(|_| RoutingError::InvalidDay {
                            rule: rule.name.clone(),
                            value: name.clone(),
                        })?;
                    days.insert(day);
                }
                Some(days)
            }
            None => None,
        };

        let caller = match &rule.conditions.caller_pattern {
            Some(pattern) => Some(Regex::new(pattern).map_err(|source| {
                RoutingError::InvalidPattern {
                    rule: rule.name.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let organization_digits = rule.conditions.organization_number.as_deref().map(digits);

        Ok(Self {
            rule,
            window,
            days,
            caller,
            organization_digits,
        })
    }

    /// Every present condition must hold.
    pub(crate) fn matches(
        &self,
        caller: &str,
        organization_number: &str,
        time: NaiveTime,
        day: Weekday,
    ) -> bool {
        if let Some(window) = &self.window
            && !window.contains(time)
        {
            return false;
        }
        if let Some(days) = &self.days
            && !days.contains(&day)
        {
            return false;
        }
        if let Some(pattern) = &self.caller
            && !pattern.is_match(caller)
        {
            return false;
        }
        if let Some(expected) = &self.organization_digits
            && *expected != digits(organization_number)
        {
            return false;
        }
        true
    }
}

fn parse_time(rule: &str, value: &str) -> RoutingResult<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|_| RoutingError::InvalidTime {
        rule: rule.to_string(),
        value: value.to_string(),
    })
}

fn digits(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}
