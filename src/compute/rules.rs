//! The catalog of local update rules and its specificity-based dispatch.
//!
//! A rule is keyed by node kind, the role of the interface whose outbound it
//! computes, and one inbound pattern per other interface (in the node's
//! declared order). Dispatch picks the unique most specific match. Patterns
//! that could tie are rejected when the catalog is built, never at dispatch.
use super::error::DispatchError;
use crate::store::Family;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct RuleId(pub u32);

impl RuleId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
}

/// What actually arrives on one port when a step is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InboundType {
    /// Nothing arrives (the port is not an input for this step).
    Absent,
    /// A literal from a constant producer.
    Constant,
    Message(Family),
}

impl fmt::Display for InboundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundType::Absent => write!(f, "Absent"),
            InboundType::Constant => write!(f, "Constant"),
            InboundType::Message(family) => write!(f, "{:?}", family),
        }
    }
}

/// A set of inbound types a rule accepts on one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    Absent,
    Constant,
    Family(Family),
    AnyMessage,
    Any,
}

impl Pattern {
    pub fn matches(&self, observed: InboundType) -> bool {
        match (self, observed) {
            (Pattern::Any, _) => true,
            (Pattern::AnyMessage, InboundType::Message(_)) => true,
            (Pattern::Family(f), InboundType::Message(g)) => *f == g,
            (Pattern::Constant, InboundType::Constant) => true,
            (Pattern::Absent, InboundType::Absent) => true,
            _ => false,
        }
    }

    /// Set inclusion: every type accepted by `other` is accepted by `self`.
    pub fn contains(&self, other: &Pattern) -> bool {
        match (self, other) {
            (Pattern::Any, _) => true,
            (Pattern::AnyMessage, Pattern::AnyMessage | Pattern::Family(_)) => true,
            (a, b) => a == b,
        }
    }

    /// Intersection of two patterns, when they overlap. In this lattice an
    /// intersection is always itself a pattern.
    pub fn meet(&self, other: &Pattern) -> Option<Pattern> {
        if self.contains(other) {
            Some(*other)
        } else if other.contains(self) {
            Some(*self)
        } else {
            None
        }
    }
}

/// Alternate argument policy for rules that can use an auxiliary node
/// parameter (e.g. a declared inverse function).
///
/// When the node carries `param`, its value is passed as an extra argument.
/// Otherwise the inbound on `required_role` becomes mandatory, even when that
/// role is the port being computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub param: String,
    pub required_role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub kind: String,
    pub outbound_role: String,
    /// One pattern per interface other than the outbound, in declared order.
    pub inbounds: SmallVec<[Pattern; 4]>,
    /// Family of the outbound message this rule produces.
    pub produces: Family,
    pub fallback: Option<FallbackPolicy>,
}

impl Rule {
    pub fn new(
        name: &str,
        kind: &str,
        outbound_role: &str,
        inbounds: impl IntoIterator<Item = Pattern>,
        produces: Family,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            outbound_role: outbound_role.to_string(),
            inbounds: inbounds.into_iter().collect(),
            produces,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, param: &str, required_role: &str) -> Self {
        self.fallback = Some(FallbackPolicy { param: param.to_string(), required_role: required_role.to_string() });
        self
    }

    pub fn matches(&self, signature: &[InboundType]) -> bool {
        self.inbounds.len() == signature.len() && self.inbounds.iter().zip(signature).all(|(p, t)| p.matches(*t))
    }

    /// Pointwise containment of the pattern tuples.
    fn contains(&self, other: &Rule) -> bool {
        self.inbounds.len() == other.inbounds.len()
            && self.inbounds.iter().zip(&other.inbounds).all(|(a, b)| a.contains(b))
    }

    fn meet(&self, other: &Rule) -> Option<SmallVec<[Pattern; 4]>> {
        if self.inbounds.len() != other.inbounds.len() {
            return None;
        }
        self.inbounds.iter().zip(&other.inbounds).map(|(a, b)| a.meet(b)).collect()
    }
}

type RuleKey = (String, String);

fn key_of(rule: &Rule) -> RuleKey { (rule.kind.clone(), rule.outbound_role.clone()) }

/// Collects rules, then validates them all at once in [`RuleCatalogBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct RuleCatalogBuilder {
    rules: Vec<Rule>,
}

impl RuleCatalogBuilder {
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, rule: Rule) -> Result<RuleId, DispatchError> {
        if rule.kind.is_empty() || rule.outbound_role.is_empty() {
            return Err(DispatchError::InvalidRule {
                name: rule.name,
                reason: "kind and outbound role must be non-empty".into(),
            });
        }
        let duplicate = self.rules.iter().any(|r| {
            r.kind == rule.kind && r.outbound_role == rule.outbound_role && r.inbounds == rule.inbounds
        });
        if duplicate {
            return Err(DispatchError::DuplicateRule { name: rule.name });
        }
        let id = RuleId(self.rules.len() as u32);
        trace!(rule = %rule.name, kind = %rule.kind, role = %rule.outbound_role, "registered rule");
        self.rules.push(rule);
        Ok(id)
    }

    /// Chainable form of [`register`](Self::register).
    pub fn with(mut self, rule: Rule) -> Result<Self, DispatchError> {
        self.register(rule)?;
        Ok(self)
    }

    /// Validates that no signature can ever have two equally specific matches.
    ///
    /// Two overlapping rules whose patterns are incomparable are accepted only
    /// if a third rule registers exactly their intersection.
    pub fn build(self) -> Result<RuleCatalog, DispatchError> {
        let mut index: HashMap<RuleKey, Vec<RuleId>> = HashMap::new();
        for (i, rule) in self.rules.iter().enumerate() {
            index.entry(key_of(rule)).or_default().push(RuleId(i as u32));
        }

        for ids in index.values() {
            for (n, &a) in ids.iter().enumerate() {
                for &b in &ids[n + 1..] {
                    let (ra, rb) = (&self.rules[a.index()], &self.rules[b.index()]);
                    let Some(meet) = ra.meet(rb) else { continue };
                    if ra.contains(rb) || rb.contains(ra) {
                        continue;
                    }
                    let covered = ids.iter().any(|&c| self.rules[c.index()].inbounds == meet);
                    if !covered {
                        return Err(DispatchError::AmbiguousRule {
                            kind: ra.kind.clone(),
                            role: ra.outbound_role.clone(),
                            rules: vec![ra.name.clone(), rb.name.clone()],
                        });
                    }
                }
            }
        }

        debug!(rules = self.rules.len(), keys = index.len(), "built rule catalog");
        Ok(RuleCatalog { rules: self.rules, index })
    }
}

/// A validated, immutable rule table.
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<Rule>,
    index: HashMap<RuleKey, Vec<RuleId>>,
}

impl RuleCatalog {
    pub fn builder() -> RuleCatalogBuilder { RuleCatalogBuilder::new() }
    pub fn len(&self) -> usize { self.rules.len() }
    pub fn is_empty(&self) -> bool { self.rules.is_empty() }
    pub fn rule(&self, id: RuleId) -> &Rule { &self.rules[id.index()] }

    /// Picks the unique most specific rule matching `signature`.
    pub fn resolve(&self, kind: &str, role: &str, signature: &[InboundType]) -> Result<RuleId, DispatchError> {
        let candidates: SmallVec<[RuleId; 4]> = self
            .index
            .get(&(kind.to_string(), role.to_string()))
            .map(|ids| ids.iter().copied().filter(|&id| self.rule(id).matches(signature)).collect())
            .unwrap_or_default();

        let most_specific: SmallVec<[RuleId; 2]> = candidates
            .iter()
            .copied()
            .filter(|&c| {
                !candidates
                    .iter()
                    .any(|&d| d != c && self.rule(c).contains(self.rule(d)))
            })
            .collect();

        match most_specific.as_slice() {
            [id] => Ok(*id),
            [] => Err(DispatchError::NoApplicableRule {
                kind: kind.to_string(),
                role: role.to_string(),
                signature: format_signature(signature),
            }),
            many => Err(DispatchError::AmbiguousRule {
                kind: kind.to_string(),
                role: role.to_string(),
                rules: many.iter().map(|&id| self.rule(id).name.clone()).collect(),
            }),
        }
    }
}

pub fn format_signature(signature: &[InboundType]) -> String {
    let parts: Vec<String> = signature.iter().map(|t| t.to_string()).collect();
    format!("({})", parts.join(", "))
}
