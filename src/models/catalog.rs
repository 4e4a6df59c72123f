use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Item condition scale used for price scaling and condition suggestions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl ItemCondition {
    /// Multiplier applied to the category average sale price.
    pub fn price_multiplier(self) -> f64 {
        match self {
            ItemCondition::New => 1.0,
            ItemCondition::LikeNew => 0.85,
            ItemCondition::Good => 0.7,
            ItemCondition::Fair => 0.55,
            ItemCondition::Poor => 0.4,
        }
    }
}

impl Default for ItemCondition {
    fn default() -> Self {
        ItemCondition::Good
    }
}

/// A listing category with its keyword list, as consumed by suggestion
/// derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
}

/// Trailing-window price statistics for a (category, condition) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceStats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sample_size: i64,
}

/// In-memory snapshot of the category catalog, loaded once per process and
/// refreshed by the worker.
#[derive(Debug, Clone, Default)]
pub struct CategoryCatalog {
    pub categories: Vec<Category>,
}

impl CategoryCatalog {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn get(&self, id: Uuid) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_multipliers() {
        assert_eq!(ItemCondition::New.price_multiplier(), 1.0);
        assert_eq!(ItemCondition::Good.price_multiplier(), 0.7);
        assert_eq!(ItemCondition::Poor.price_multiplier(), 0.4);
    }

    #[test]
    fn test_condition_wire_format() {
        assert_eq!(ItemCondition::LikeNew.to_string(), "like_new");
        assert_eq!("fair".parse::<ItemCondition>().unwrap(), ItemCondition::Fair);
    }
}
