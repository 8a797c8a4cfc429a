//! Loot table module
//!
//! Pure weighted-sampling loot generation over static table definitions:
//! - Roulette selection proportional to entry weights
//! - Guaranteed drops emitted before any rolls
//! - Quantity specs as exact values or inclusive ranges, scaled by a
//!   multiplier and floored
//! - Unique entries never accumulate past a single grant
//!
//! Table definitions are externally authored and read-only at runtime; the
//! `LootTableRegistry` holds them for lookup by name.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Quantity specification for a loot entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QuantitySpec {
    /// Always this exact quantity
    Exact(u32),
    /// Uniform integer in the inclusive range [min, max]
    Range { min: u32, max: u32 },
}

impl QuantitySpec {
    /// Resolve the spec to a concrete quantity, scaled by `multiplier`
    /// and floored
    pub fn resolve(&self, multiplier: f64, rng: &mut impl Rng) -> u32 {
        let base = match *self {
            QuantitySpec::Exact(qty) => qty,
            QuantitySpec::Range { min, max } => {
                if min >= max {
                    min
                } else {
                    rng.gen_range(min..=max)
                }
            }
        };
        (base as f64 * multiplier).floor() as u32
    }
}

/// A weighted entry in a loot table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootEntry {
    /// Item granted when this entry is selected
    pub item_id: String,
    /// Selection weight; 0 makes the entry unselectable
    pub weight: f64,
    /// Quantity granted per selection
    pub quantity: QuantitySpec,
    /// Unique items never accumulate past a single grant
    #[serde(default)]
    pub unique: bool,
}

/// A drop granted on every generation, independent of the rolls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuaranteedDrop {
    pub item_id: String,
    pub quantity: QuantitySpec,
}

/// A static loot table definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LootTableDefinition {
    /// Table name used for registry lookup
    pub name: String,
    /// Weighted entries selected by the rolls
    pub entries: Vec<LootEntry>,
    /// Drops granted on every generation
    #[serde(default)]
    pub guaranteed: Vec<GuaranteedDrop>,
    /// Inclusive range for the number of rolls per generation
    pub min_rolls: u32,
    pub max_rolls: u32,
}

impl LootTableDefinition {
    /// Sum of all entry weights
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}

/// A generated (item, quantity) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LootStack {
    pub item_id: String,
    pub quantity: u32,
}

/// Result of a loot generation
#[derive(Debug, Clone, Default)]
pub struct GeneratedLoot {
    /// Generated stacks, guaranteed drops first
    pub stacks: Vec<LootStack>,
    /// True when the table had entries but a total weight of 0, making the
    /// roulette walk ill-defined; only guaranteed drops were produced
    pub degenerate_weights: bool,
}

impl GeneratedLoot {
    /// Find the quantity of an item in the result
    pub fn quantity_of(&self, item_id: &str) -> u32 {
        self.stacks
            .iter()
            .find(|s| s.item_id == item_id)
            .map(|s| s.quantity)
            .unwrap_or(0)
    }
}

/// Generate loot from a table definition.
///
/// Guaranteed drops are emitted first; then `rolls` weighted selections are
/// made over the entries. Quantities are resolved per selection, scaled by
/// `multiplier` and floored; a quantity floored to 0 is omitted. Repeated
/// selections of a non-unique item merge by summing quantities; a unique
/// item already present drops the roll entirely.
pub fn generate(
    table: &LootTableDefinition,
    multiplier: f64,
    rng: &mut impl Rng,
) -> GeneratedLoot {
    let mut result = GeneratedLoot::default();

    // Guaranteed drops, independent of the roll outcomes
    for drop in &table.guaranteed {
        let quantity = drop.quantity.resolve(multiplier, rng);
        merge_stack(&mut result.stacks, &drop.item_id, quantity, false);
    }

    if table.entries.is_empty() {
        return result;
    }

    let total_weight = table.total_weight();
    if total_weight <= 0.0 {
        // Ill-defined roulette walk; flag it rather than return malformed
        // selections
        warn!(
            table = %table.name,
            "Loot table has zero total weight; returning guaranteed drops only"
        );
        result.degenerate_weights = true;
        return result;
    }

    let rolls = if table.min_rolls >= table.max_rolls {
        table.min_rolls
    } else {
        rng.gen_range(table.min_rolls..=table.max_rolls)
    };

    for _ in 0..rolls {
        let x = rng.gen_range(0.0..total_weight);

        // Walk entries accumulating weight; the first entry whose
        // cumulative weight reaches x wins
        let mut cumulative = 0.0;
        for entry in &table.entries {
            cumulative += entry.weight;
            if cumulative >= x {
                let quantity = entry.quantity.resolve(multiplier, rng);
                merge_stack(&mut result.stacks, &entry.item_id, quantity, entry.unique);
                break;
            }
        }
    }

    debug!(
        table = %table.name,
        rolls = rolls,
        stacks = result.stacks.len(),
        "Generated loot"
    );

    result
}

/// Merge a granted quantity into the result stacks.
///
/// Zero quantities are dropped (a multiplier below 1 can floor a grant to
/// nothing). A unique item already present drops the grant entirely.
fn merge_stack(stacks: &mut Vec<LootStack>, item_id: &str, quantity: u32, unique: bool) {
    if quantity == 0 {
        return;
    }

    if let Some(existing) = stacks.iter_mut().find(|s| s.item_id == item_id) {
        if unique {
            return;
        }
        existing.quantity += quantity;
    } else {
        stacks.push(LootStack {
            item_id: item_id.to_string(),
            quantity,
        });
    }
}

/// Holds the loot tables known to the server, keyed by name
pub struct LootTableRegistry {
    tables: RwLock<HashMap<String, LootTableDefinition>>,
}

impl Default for LootTableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LootTableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry seeded with the built-in tables
    pub fn with_builtin_tables() -> Self {
        let registry = Self::new();
        for table in builtin_tables() {
            registry.register(table);
        }
        registry
    }

    /// Register a table, replacing any previous table with the same name
    pub fn register(&self, table: LootTableDefinition) {
        debug!(table = %table.name, entries = table.entries.len(), "Registered loot table");
        self.tables.write().insert(table.name.clone(), table);
    }

    /// Look up a table by name
    pub fn get(&self, name: &str) -> Option<LootTableDefinition> {
        self.tables.read().get(name).cloned()
    }

    /// Number of registered tables
    pub fn count(&self) -> usize {
        self.tables.read().len()
    }
}

/// Built-in loot tables shipped with the server
fn builtin_tables() -> Vec<LootTableDefinition> {
    vec![
        LootTableDefinition {
            name: "forest_wolf".to_string(),
            entries: vec![
                LootEntry {
                    item_id: "wolf_pelt".to_string(),
                    weight: 60.0,
                    quantity: QuantitySpec::Range { min: 1, max: 2 },
                    unique: false,
                },
                LootEntry {
                    item_id: "sharp_fang".to_string(),
                    weight: 30.0,
                    quantity: QuantitySpec::Exact(1),
                    unique: false,
                },
                LootEntry {
                    item_id: "moon_charm".to_string(),
                    weight: 10.0,
                    quantity: QuantitySpec::Exact(1),
                    unique: true,
                },
            ],
            guaranteed: vec![GuaranteedDrop {
                item_id: "raw_meat".to_string(),
                quantity: QuantitySpec::Exact(1),
            }],
            min_rolls: 1,
            max_rolls: 2,
        },
        LootTableDefinition {
            name: "cave_bandit".to_string(),
            entries: vec![
                LootEntry {
                    item_id: "gold_coin".to_string(),
                    weight: 70.0,
                    quantity: QuantitySpec::Range { min: 5, max: 25 },
                    unique: false,
                },
                LootEntry {
                    item_id: "rusty_dagger".to_string(),
                    weight: 25.0,
                    quantity: QuantitySpec::Exact(1),
                    unique: false,
                },
                LootEntry {
                    item_id: "bandit_mask".to_string(),
                    weight: 5.0,
                    quantity: QuantitySpec::Exact(1),
                    unique: true,
                },
            ],
            guaranteed: Vec::new(),
            min_rolls: 1,
            max_rolls: 3,
        },
        LootTableDefinition {
            name: "ember_golem".to_string(),
            entries: vec![
                LootEntry {
                    item_id: "ember_shard".to_string(),
                    weight: 50.0,
                    quantity: QuantitySpec::Range { min: 2, max: 4 },
                    unique: false,
                },
                LootEntry {
                    item_id: "molten_core".to_string(),
                    weight: 8.0,
                    quantity: QuantitySpec::Exact(1),
                    unique: true,
                },
                LootEntry {
                    item_id: "stone_chunk".to_string(),
                    weight: 42.0,
                    quantity: QuantitySpec::Range { min: 1, max: 3 },
                    unique: false,
                },
            ],
            guaranteed: vec![GuaranteedDrop {
                item_id: "gold_coin".to_string(),
                quantity: QuantitySpec::Range { min: 10, max: 40 },
            }],
            min_rolls: 2,
            max_rolls: 4,
        },
    ]
}
