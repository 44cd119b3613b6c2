//! Call routing rules.
//!
//! Rules are loaded once from configuration, validated, and kept in
//! ascending priority order. Each incoming call gets exactly one action: the
//! first rule whose conditions all hold, or routing to an agent when none
//! does.

mod router;
mod rule;

pub use router::{CallContext, Router, RoutingDecision};
pub use rule::{
    RouteAction, RouteActionKind, RoutingError, RoutingResult, RoutingRule, RuleConditions,
    TimeWindowSpec,
};
