use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use serde::Serialize;

use super::rule::{CompiledRule, RouteAction, RoutingError, RoutingResult, RoutingRule};

/// Facts about an incoming call that rules are evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub caller: &'a str,
    pub organization_number: &'a str,
    pub at: DateTime<Utc>,
}

/// The single action chosen for a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    /// Matched rule, `None` when the default applied
    pub rule_name: Option<String>,
    pub action: RouteAction,
}

impl RoutingDecision {
    pub fn default_agent() -> Self {
        Self {
            rule_name: None,
            action: RouteAction::agent(),
        }
    }
}

/// Priority-ordered rule table. Read-only once built.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<CompiledRule>,
    offset: FixedOffset,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            offset: Utc.fix(),
        }
    }
}

impl Router {
    /// Validate and order the rules.
    ///
    /// `utc_offset_minutes` is the local offset that time windows and days of
    /// week are evaluated in.
    pub fn new(rules: Vec<RoutingRule>, utc_offset_minutes: i32) -> RoutingResult<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or(RoutingError::InvalidOffset(utc_offset_minutes))?;

        let mut compiled = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<RoutingResult<Vec<_>>>()?;
        compiled.sort_by_key(|c| c.rule.priority);

        for pair in compiled.windows(2) {
            if pair[0].rule.priority == pair[1].rule.priority {
                return Err(RoutingError::DuplicatePriority {
                    priority: pair[0].rule.priority,
                    first: pair[0].rule.name.clone(),
                    second: pair[1].rule.name.clone(),
                });
            }
        }

        Ok(Self {
            rules: compiled,
            offset,
        })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> impl Iterator<Item = &RoutingRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Choose the action for a call: the lowest-priority rule whose
    /// conditions all hold, else route to an agent.
    pub fn route(&self, ctx: CallContext<'_>) -> RoutingDecision {
        let local = ctx.at.with_timezone(&self.offset);
        let time = local.time();
        let day = local.weekday();

        for compiled in &self.rules {
            if compiled.matches(ctx.caller, ctx.organization_number, time, day) {
                tracing::debug!(
                    rule = %compiled.rule.name,
                    action = %compiled.rule.action.kind,
                    "Routing rule matched"
                );
                return RoutingDecision {
                    rule_name: Some(compiled.rule.name.clone()),
                    action: compiled.rule.action.clone(),
                };
            }
        }
        RoutingDecision::default_agent()
    }
}
