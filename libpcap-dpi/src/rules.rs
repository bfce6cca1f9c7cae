//! Block rules
//!
//! Rules are owned by a `RuleStore`. Each run takes a `RuleSet` snapshot of the
//! active rules when it starts; later changes to the store do not affect it.

use crate::error::AnalysisError;
use crate::packet::PacketDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Either endpoint address equals the value
    Ip,
    /// Name contains the value (case-insensitive)
    Domain,
    /// Application label equals the value (case-insensitive)
    App,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RuleKind::Ip => "ip",
            RuleKind::Domain => "domain",
            RuleKind::App => "app",
        };
        f.write_str(s)
    }
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub kind: RuleKind,
    pub value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl BlockRule {
    pub fn new<S: Into<String>>(kind: RuleKind, value: S) -> Self {
        BlockRule {
            kind,
            value: value.into(),
            description: String::new(),
            active: true,
        }
    }

    pub fn with_description<S: Into<String>>(self, description: S) -> Self {
        BlockRule {
            description: description.into(),
            ..self
        }
    }
}

impl fmt::Display for BlockRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

#[derive(Debug, Default, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<BlockRule>,
}

/// Parse a TOML rule file made of `[[rule]]` tables
pub fn parse_rules(s: &str) -> Result<Vec<BlockRule>, AnalysisError> {
    let file: RuleFile = toml::from_str(s).map_err(|e| AnalysisError::Rules(e.to_string()))?;
    Ok(file.rule)
}

/// Source of block rules
pub trait RuleStore: Send + Sync {
    /// Active rules, in store order
    fn active_rules(&self) -> Vec<BlockRule>;
}

/// Rule store held in memory
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<BlockRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        MemoryRuleStore::default()
    }

    pub fn with_rules(rules: Vec<BlockRule>) -> Self {
        MemoryRuleStore {
            rules: RwLock::new(rules),
        }
    }

    /// Append a rule and return its index
    pub fn add(&self, rule: BlockRule) -> usize {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.push(rule);
        rules.len() - 1
    }

    pub fn remove(&self, index: usize) -> Option<BlockRule> {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if index < rules.len() {
            Some(rules.remove(index))
        } else {
            None
        }
    }

    /// Enable or disable a rule. Returns false if there is no such rule.
    pub fn set_active(&self, index: usize, active: bool) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        match rules.get_mut(index) {
            Some(rule) => {
                rule.active = active;
                true
            }
            None => false,
        }
    }

    /// Load rules from a TOML document, appending them. Returns the number of rules read.
    pub fn load<R: io::Read>(&self, mut input: R) -> Result<usize, AnalysisError> {
        let mut s = String::new();
        input.read_to_string(&mut s)?;
        let new_rules = parse_rules(&s)?;
        let count = new_rules.len();
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(new_rules);
        Ok(count)
    }

    pub fn rules(&self) -> Vec<BlockRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RuleStore for MemoryRuleStore {
    fn active_rules(&self) -> Vec<BlockRule> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
enum Matcher {
    Ip(Ipv4Addr),
    Domain(String),
    App(String),
}

/// Immutable snapshot of active rules, with values normalized once
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<(Matcher, BlockRule)>,
}

impl RuleSet {
    /// Compile rules. Inactive rules, empty values and invalid addresses are skipped.
    pub fn new<I: IntoIterator<Item = BlockRule>>(rules: I) -> Self {
        let rules = rules
            .into_iter()
            .filter(|r| r.active)
            .filter_map(|rule| {
                let value = rule.value.trim();
                if value.is_empty() {
                    warn!("ignoring {} rule with empty value", rule.kind);
                    return None;
                }
                let matcher = match rule.kind {
                    RuleKind::Ip => match value.parse::<Ipv4Addr>() {
                        Ok(addr) => Matcher::Ip(addr),
                        Err(_) => {
                            warn!("ignoring ip rule with invalid address '{}'", value);
                            return None;
                        }
                    },
                    RuleKind::Domain => Matcher::Domain(value.to_ascii_lowercase()),
                    RuleKind::App => Matcher::App(value.to_ascii_lowercase()),
                };
                Some((matcher, rule))
            })
            .collect();
        RuleSet { rules }
    }

    /// Snapshot the active rules of `store`
    pub fn snapshot(store: &dyn RuleStore) -> Self {
        let set = RuleSet::new(store.active_rules());
        debug!("rule snapshot: {} active rules", set.len());
        set
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule matching the packet, given its effective name and application label
    pub fn check(&self, desc: &PacketDescriptor, name: Option<&str>, app: &str) -> Option<&BlockRule> {
        let mut lower_name: Option<String> = None;
        for (matcher, rule) in self.rules.iter() {
            let hit = match matcher {
                Matcher::Ip(addr) => desc.src_ip == *addr || desc.dst_ip == *addr,
                Matcher::Domain(fragment) => match name {
                    Some(name) => lower_name
                        .get_or_insert_with(|| name.to_ascii_lowercase())
                        .contains(fragment.as_str()),
                    None => false,
                },
                Matcher::App(label) => app.eq_ignore_ascii_case(label),
            };
            if hit {
                return Some(rule);
            }
        }
        None
    }
}
