//! Componentwise resource arithmetic shared by the fair-share engine, the
//! action pipeline, and the GPU accounting.
//!
//! Generalizes `libscheduler::models::ResourcesRequirements`, which only
//! ever carried `cpu` and `memory` millicores/bytes. GPU demand is real
//! (fractional sharing plus whole-device counts), so `gpu` is an `f64`
//! rather than an integer count.

use std::fmt;
use std::ops::{Add, Sub};

/// The three resource dimensions the fair-share engine and solvers reason
/// about componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceName {
    Cpu,
    Memory,
    Gpu,
}

/// A concrete (always non-negative in practice) resource vector: what a
/// pod requests, what a node has allocatable, what a queue has allocated.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Resources {
    /// CPU, in millicores.
    pub cpu_millis: u64,
    /// Memory, in bytes.
    pub memory_bytes: u64,
    /// GPU demand: whole GPUs, fractional shares, and DRA device counts
    /// are all expressed on this one real-valued axis.
    pub gpu: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        cpu_millis: 0,
        memory_bytes: 0,
        gpu: 0.0,
    };

    pub fn new(cpu_millis: u64, memory_bytes: u64, gpu: f64) -> Self {
        Self {
            cpu_millis,
            memory_bytes,
            gpu,
        }
    }

    /// `self` fits within `capacity`, componentwise.
    pub fn fits_within(&self, capacity: &Resources) -> bool {
        self.cpu_millis <= capacity.cpu_millis
            && self.memory_bytes <= capacity.memory_bytes
            && self.gpu <= capacity.gpu + f64::EPSILON
    }

    pub fn saturating_sub(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_sub(other.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            gpu: (self.gpu - other.gpu).max(0.0),
        }
    }

    pub fn get(&self, name: ResourceName) -> f64 {
        match name {
            ResourceName::Cpu => self.cpu_millis as f64,
            ResourceName::Memory => self.memory_bytes as f64,
            ResourceName::Gpu => self.gpu,
        }
    }

    pub fn max(&self, other: &Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.max(other.cpu_millis),
            memory_bytes: self.memory_bytes.max(other.memory_bytes),
            gpu: self.gpu.max(other.gpu),
        }
    }
}

impl Add for Resources {
    type Output = Resources;
    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis + rhs.cpu_millis,
            memory_bytes: self.memory_bytes + rhs.memory_bytes,
            gpu: self.gpu + rhs.gpu,
        }
    }
}

impl Sub for Resources {
    type Output = Resources;
    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu_millis: self.cpu_millis.saturating_sub(rhs.cpu_millis),
            memory_bytes: self.memory_bytes.saturating_sub(rhs.memory_bytes),
            gpu: self.gpu - rhs.gpu,
        }
    }
}

/// A queue-quota-shaped scalar: §4.2 says "a negative quota means
/// unlimited" and that comparisons must treat it as +∞. Rather than
/// sprinkle `if x < 0` checks through the fair-share engine, quota fields
/// are this explicit two-variant type and every arithmetic op on it
/// documents how `Unlimited` propagates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Limited(f64),
    Unlimited,
}

impl Quantity {
    /// Constructs from the raw CRD field convention: negative = unlimited.
    pub fn from_raw(raw: f64) -> Self {
        if raw < 0.0 {
            Quantity::Unlimited
        } else {
            Quantity::Limited(raw)
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Quantity::Unlimited)
    }

    /// Clamp `value` to this quantity, treating `Unlimited` as +∞.
    pub fn clamp_value(&self, value: f64) -> f64 {
        match self {
            Quantity::Limited(q) => value.min(*q),
            Quantity::Unlimited => value,
        }
    }

    /// `self < other`, with `Unlimited` compared as +∞.
    pub fn less_than(&self, other: f64) -> bool {
        match self {
            Quantity::Limited(q) => *q < other,
            Quantity::Unlimited => false,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Quantity::Limited(q) => *q,
            Quantity::Unlimited => f64::INFINITY,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Limited(q) => write!(f, "{q}"),
            Quantity::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// The per-resource quota triple carried by a `Queue`'s spec: `deserved`,
/// `limit`, and the non-negative `overQuotaWeight`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaResources {
    pub cpu: Quantity,
    pub memory: Quantity,
    pub gpu: Quantity,
}

impl QuotaResources {
    pub fn get(&self, name: ResourceName) -> Quantity {
        match name {
            ResourceName::Cpu => self.cpu,
            ResourceName::Memory => self.memory,
            ResourceName::Gpu => self.gpu,
        }
    }
}
