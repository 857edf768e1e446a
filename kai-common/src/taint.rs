//! Node taints and pod tolerations, generalized from
//! `libscheduler::models::{Taint, TaintEffect, TaintKey, Toleration}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintEffect {
    NoSchedule,
    PreferNoSchedule,
    NoExecute,
}

/// Well-known taint keys the scheduler itself reasons about, alongside an
/// arbitrary user-defined key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaintKey {
    NodeNotReady,
    NodeUnschedulable,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taint {
    pub key: TaintKey,
    pub value: String,
    pub effect: TaintEffect,
}

impl Taint {
    pub fn new(key: TaintKey, effect: TaintEffect) -> Self {
        Self {
            key,
            value: String::new(),
            effect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TolerationOperator {
    Exists,
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toleration {
    pub key: Option<TaintKey>,
    pub operator: TolerationOperator,
    pub value: String,
    /// `None` tolerates all effects.
    pub effect: Option<TaintEffect>,
}

impl Toleration {
    pub fn tolerate(&self, taint: &Taint) -> bool {
        if let Some(effect) = &self.effect
            && *effect != taint.effect
        {
            return false;
        }
        match &self.key {
            Some(key) if *key != taint.key => false,
            _ => match self.operator {
                TolerationOperator::Exists => true,
                TolerationOperator::Equal => self.value == taint.value,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_operator_ignores_value() {
        let taint = Taint::new(TaintKey::NodeUnschedulable, TaintEffect::NoSchedule);
        let toleration = Toleration {
            key: Some(TaintKey::NodeUnschedulable),
            operator: TolerationOperator::Exists,
            value: String::new(),
            effect: None,
        };
        assert!(toleration.tolerate(&taint));
    }

    #[test]
    fn mismatched_effect_does_not_tolerate() {
        let taint = Taint::new(TaintKey::NodeUnschedulable, TaintEffect::NoExecute);
        let toleration = Toleration {
            key: Some(TaintKey::NodeUnschedulable),
            operator: TolerationOperator::Exists,
            value: String::new(),
            effect: Some(TaintEffect::NoSchedule),
        };
        assert!(!toleration.tolerate(&taint));
    }
}
