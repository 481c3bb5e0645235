// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Quantity calculation
//!
//! The ledger is a derived view over an element set: category → unit →
//! total. Contributions are sorted before they are summed, so the totals
//! are bit-identical for any ordering of the same elements.

use crate::config::TakeoffConfig;
use crate::element::{DetectedElement, ElementCategory, ElementId, ElementSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Unit of a ledger total
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    #[serde(rename = "length_m")]
    LengthM,
    #[serde(rename = "area_m2")]
    AreaM2,
    #[serde(rename = "volume_m3")]
    VolumeM3,
    #[serde(rename = "count")]
    Count,
}

impl Unit {
    pub fn key(&self) -> &'static str {
        match self {
            Unit::LengthM => "length_m",
            Unit::AreaM2 => "area_m2",
            Unit::VolumeM3 => "volume_m3",
            Unit::Count => "count",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::LengthM => "m",
            Unit::AreaM2 => "m²",
            Unit::VolumeM3 => "m³",
            Unit::Count => "ea",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

pub type UnitTotals = BTreeMap<Unit, f64>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerSummary {
    pub total_elements: usize,
    pub per_category: BTreeMap<ElementCategory, usize>,
    pub exterior_wall_length_m: f64,
    pub interior_wall_length_m: f64,
}

/// Aggregated quantities for an element set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuantityLedger {
    /// Category → unit → total
    pub totals: BTreeMap<ElementCategory, UnitTotals>,
    /// Same totals rolled up by group name ("Wall" covers both wall kinds)
    pub groups: BTreeMap<String, UnitTotals>,
    pub summary: LedgerSummary,
    /// Built before every page finished
    pub provisional: bool,
}

/// One position of a take-off list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuantityItem {
    pub position: String,
    pub element: ElementId,
    pub category: ElementCategory,
    pub description: String,
    pub quantity: f64,
    pub unit: Unit,
}

impl QuantityLedger {
    /// Build the ledger over a complete element set
    pub fn from_elements(elements: &ElementSet, config: &TakeoffConfig) -> Self {
        let mut contributions: BTreeMap<ElementCategory, BTreeMap<Unit, Vec<f64>>> = BTreeMap::new();
        for element in elements {
            for (unit, value) in contributions_of(element, config) {
                contributions
                    .entry(element.category)
                    .or_default()
                    .entry(unit)
                    .or_default()
                    .push(value);
            }
        }

        let mut totals: BTreeMap<ElementCategory, UnitTotals> = BTreeMap::new();
        let mut group_values: BTreeMap<String, BTreeMap<Unit, Vec<f64>>> = BTreeMap::new();
        for (category, units) in contributions {
            for (unit, values) in units {
                totals
                    .entry(category)
                    .or_default()
                    .insert(unit, stable_sum(values.clone()));
                group_values
                    .entry(category.group().to_string())
                    .or_default()
                    .entry(unit)
                    .or_default()
                    .extend(values);
            }
        }
        let groups = group_values
            .into_iter()
            .map(|(group, units)| {
                let units = units
                    .into_iter()
                    .map(|(unit, values)| (unit, stable_sum(values)))
                    .collect();
                (group, units)
            })
            .collect();

        let wall_length = |category: ElementCategory| {
            stable_sum(
                elements
                    .by_category(category)
                    .filter_map(|e| e.measurements.length_m)
                    .collect(),
            )
        };

        Self {
            totals,
            groups,
            summary: LedgerSummary {
                total_elements: elements.len(),
                per_category: elements.counts(),
                exterior_wall_length_m: wall_length(ElementCategory::ExteriorWall),
                interior_wall_length_m: wall_length(ElementCategory::InteriorWall),
            },
            provisional: false,
        }
    }

    /// Ledger over a partial element set, marked as provisional
    pub fn provisional(elements: &ElementSet, config: &TakeoffConfig) -> Self {
        Self {
            provisional: true,
            ..Self::from_elements(elements, config)
        }
    }

    pub fn total(&self, category: ElementCategory, unit: Unit) -> f64 {
        self.totals
            .get(&category)
            .and_then(|units| units.get(&unit))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn group_total(&self, group: &str, unit: Unit) -> f64 {
        self.groups
            .get(group)
            .and_then(|units| units.get(&unit))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Ledger contributions of one element
pub fn contributions_of(element: &DetectedElement, config: &TakeoffConfig) -> Vec<(Unit, f64)> {
    let m = &element.measurements;
    let mut out = Vec::new();
    let mut push = |unit: Unit, value: Option<f64>| {
        if let Some(v) = value {
            out.push((unit, v));
        }
    };

    match element.category {
        ElementCategory::ExteriorWall | ElementCategory::InteriorWall => {
            push(Unit::LengthM, m.length_m);
            if config.ledger_wall_area {
                push(Unit::AreaM2, m.length_m.map(|l| l * config.wall_height));
            }
        }
        ElementCategory::Window | ElementCategory::Door => {
            push(Unit::Count, Some(m.count.unwrap_or(1) as f64));
            push(Unit::AreaM2, opening_area(element, config));
        }
        ElementCategory::Column => {
            push(Unit::VolumeM3, m.volume_m3);
            push(Unit::Count, Some(m.count.unwrap_or(1) as f64));
        }
        ElementCategory::Beam => {
            push(Unit::LengthM, m.length_m);
            push(Unit::VolumeM3, m.volume_m3);
        }
        ElementCategory::Slab | ElementCategory::Footing => {
            push(Unit::AreaM2, m.area_m2);
            push(Unit::VolumeM3, m.volume_m3);
        }
    }
    out
}

/// Width times the configured opening height
fn opening_area(element: &DetectedElement, config: &TakeoffConfig) -> Option<f64> {
    let height = match element.category {
        ElementCategory::Window => config.window_height,
        ElementCategory::Door => config.door_height,
        _ => return None,
    };
    element.measurements.width_m.map(|w| w * height)
}

/// Primary unit of a category in a take-off list
pub fn primary_unit(category: ElementCategory) -> Unit {
    match category {
        ElementCategory::ExteriorWall | ElementCategory::InteriorWall | ElementCategory::Beam => {
            Unit::LengthM
        }
        ElementCategory::Window | ElementCategory::Door => Unit::Count,
        ElementCategory::Column | ElementCategory::Footing => Unit::VolumeM3,
        ElementCategory::Slab => Unit::AreaM2,
    }
}

/// Numbered take-off positions, one per element
pub fn line_items(elements: &ElementSet, config: &TakeoffConfig) -> Vec<QuantityItem> {
    elements
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let unit = primary_unit(e.category);
            let quantity = contributions_of(e, config)
                .into_iter()
                .find(|(u, _)| *u == unit)
                .map_or(0.0, |(_, v)| v);
            QuantityItem {
                position: format!("{:03}", i + 1),
                element: e.id,
                category: e.category,
                description: describe(e),
                quantity,
                unit,
            }
        })
        .collect()
}

fn describe(e: &DetectedElement) -> String {
    let m = &e.measurements;
    match (e.category, m.thickness_m, m.width_m) {
        (c, Some(t), _) if c.is_wall() => format!("{} d={:.2} m", c.label(), t),
        (c, _, Some(w)) if c.is_opening() => format!("{} w={:.2} m", c.label(), w),
        (ElementCategory::Beam, _, Some(w)) => format!("Beam b={:.2} m", w),
        (c, _, _) => c.label().to_string(),
    }
}

/// Wall face area (length × height) minus hosted opening areas, per wall never below zero
pub fn net_wall_area(elements: &ElementSet, config: &TakeoffConfig) -> f64 {
    let per_wall: Vec<f64> = elements
        .walls()
        .map(|wall| {
            let gross = wall.measurements.length_m.unwrap_or(0.0) * config.wall_height;
            let openings: f64 = elements
                .openings_of(wall.id)
                .filter_map(|o| opening_area(o, config))
                .sum();
            (gross - openings).max(0.0)
        })
        .collect();
    stable_sum(per_wall)
}

/// Total concrete volume of columns, beams, slabs and footings
pub fn concrete_volume(elements: &ElementSet) -> f64 {
    stable_sum(
        elements
            .iter()
            .filter(|e| e.category.is_structural())
            .filter_map(|e| e.measurements.volume_m3)
            .collect(),
    )
}

/// Order-independent sum
fn stable_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values.iter().sum()
}
