//! Item descriptors

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key carried by equipment drops
pub const DAMAGE_ATTRIBUTE: &str = "damage";

/// Item attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemAttribute {
    /// Integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// String value
    Text(String),
}

impl ItemAttribute {
    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A stack of one item kind: `{kind, count, attributes}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item kind (e.g. "STONE")
    pub kind: String,
    /// Quantity
    pub count: u32,
    /// Instance attributes (damage, custom tags)
    #[serde(default)]
    pub attributes: BTreeMap<String, ItemAttribute>,
}

impl ItemStack {
    /// Create a new item stack
    pub fn new(kind: impl Into<String>, count: u32) -> Self {
        Self {
            kind: kind.into(),
            count,
            attributes: BTreeMap::new(),
        }
    }

    /// Create a single item
    pub fn single(kind: impl Into<String>) -> Self {
        Self::new(kind, 1)
    }

    /// Set an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: ItemAttribute) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set equipment damage
    pub fn with_damage(self, damage: u32) -> Self {
        self.with_attribute(DAMAGE_ATTRIBUTE, ItemAttribute::Int(damage as i64))
    }

    /// Equipment damage, if any
    pub fn damage(&self) -> Option<u32> {
        self.attributes
            .get(DAMAGE_ATTRIBUTE)?
            .as_int()
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Same stack with a different count
    pub fn with_count(&self, count: u32) -> Self {
        Self {
            kind: self.kind.clone(),
            count,
            attributes: self.attributes.clone(),
        }
    }

    /// Check if this stack is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Add to this stack (returns overflow if any)
    pub fn add(&mut self, amount: u32, max_stack: u32) -> u32 {
        let space = max_stack.saturating_sub(self.count);
        let to_add = amount.min(space);
        self.count += to_add;
        amount - to_add
    }

    /// Remove from this stack (returns amount actually removed)
    pub fn remove(&mut self, amount: u32) -> u32 {
        let to_remove = amount.min(self.count);
        self.count -= to_remove;
        to_remove
    }

    /// Stacks merge when kind and attributes are identical
    pub fn can_merge(&self, other: &ItemStack) -> bool {
        self.kind == other.kind && self.attributes == other.attributes
    }
}
