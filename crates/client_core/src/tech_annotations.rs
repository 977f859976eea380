use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Headline summary of how a solved technology compares to its best case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BonusStatus {
    Insufficient { shortfall_percent: f64 },
    Valid,
    Boosted { surplus_percent: f64 },
}

impl BonusStatus {
    /// `None` until something was actually solved for the tech.
    pub fn from_bonuses(max_bonus: f64, solved_bonus: f64) -> Option<Self> {
        if solved_bonus <= 0.0 {
            return None;
        }
        let max_bonus = round2(max_bonus);
        let status = if max_bonus < 100.0 {
            Self::Insufficient {
                shortfall_percent: round2(100.0 - max_bonus),
            }
        } else if max_bonus == 100.0 {
            Self::Valid
        } else {
            Self::Boosted {
                surplus_percent: round2(max_bonus - 100.0),
            }
        };
        Some(status)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechAnnotation {
    pub max_bonus: Option<f64>,
    pub solved_bonus: Option<f64>,
    pub solve_method: Option<String>,
    pub selected_module_ids: Option<Vec<String>>,
    pub bonus_status: Option<BonusStatus>,
}

impl TechAnnotation {
    fn is_blank(&self) -> bool {
        self == &Self::default()
    }
}

/// Bonus half of an annotation, the part cached under its own storage key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechBonus {
    #[serde(default)]
    pub max_bonus: Option<f64>,
    #[serde(default)]
    pub solved_bonus: Option<f64>,
    #[serde(default)]
    pub solve_method: Option<String>,
    #[serde(default)]
    pub bonus_status: Option<BonusStatus>,
}

/// Per-technology annotations keyed by tech key. Entries are created by the
/// first write that targets them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechAnnotationStore {
    entries: HashMap<String, TechAnnotation>,
}

impl TechAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tech: &str) -> Option<&TechAnnotation> {
        self.entries.get(tech)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn techs(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn set_bonuses(
        &mut self,
        tech: &str,
        max_bonus: Option<f64>,
        solved_bonus: Option<f64>,
        solve_method: &str,
    ) {
        let entry = self.entries.entry(tech.to_string()).or_default();
        entry.max_bonus = max_bonus;
        entry.solved_bonus = solved_bonus;
        entry.solve_method = Some(solve_method.to_string());
        Self::refresh_status(entry);
    }

    pub fn max_bonus(&self, tech: &str) -> Option<f64> {
        self.get(tech).and_then(|entry| entry.max_bonus)
    }

    pub fn solved_bonus(&self, tech: &str) -> Option<f64> {
        self.get(tech).and_then(|entry| entry.solved_bonus)
    }

    pub fn solve_method(&self, tech: &str) -> Option<&str> {
        self.get(tech).and_then(|entry| entry.solve_method.as_deref())
    }

    pub fn bonus_status(&self, tech: &str) -> Option<BonusStatus> {
        self.get(tech).and_then(|entry| entry.bonus_status)
    }

    /// Recomputes the cached status summary for `tech` from its bonuses.
    pub fn refresh_bonus_status(&mut self, tech: &str) {
        if let Some(entry) = self.entries.get_mut(tech) {
            Self::refresh_status(entry);
        }
    }

    fn refresh_status(entry: &mut TechAnnotation) {
        entry.bonus_status = match (entry.max_bonus, entry.solved_bonus) {
            (Some(max), Some(solved)) => BonusStatus::from_bonuses(max, solved),
            _ => None,
        };
    }

    /// Drops max/solved bonuses and status for every tech. Solve methods and
    /// module selections survive.
    pub fn clear_bonuses(&mut self) {
        for entry in self.entries.values_mut() {
            entry.max_bonus = None;
            entry.solved_bonus = None;
            entry.bonus_status = None;
        }
        self.entries.retain(|_, entry| !entry.is_blank());
    }

    /// Drops every bonus field of one tech, keeping its module selection.
    pub fn clear_tech_bonuses(&mut self, tech: &str) {
        if let Some(entry) = self.entries.get_mut(tech) {
            entry.max_bonus = None;
            entry.solved_bonus = None;
            entry.solve_method = None;
            entry.bonus_status = None;
            if entry.is_blank() {
                self.entries.remove(tech);
            }
        }
    }

    pub fn set_module_selection(&mut self, tech: &str, module_ids: Vec<String>) {
        self.entries
            .entry(tech.to_string())
            .or_default()
            .selected_module_ids = Some(module_ids);
    }

    pub fn module_selection(&self, tech: &str) -> Option<&[String]> {
        self.get(tech)
            .and_then(|entry| entry.selected_module_ids.as_deref())
    }

    pub fn clear_module_selection(&mut self, tech: &str) {
        if let Some(entry) = self.entries.get_mut(tech) {
            entry.selected_module_ids = None;
            if entry.is_blank() {
                self.entries.remove(tech);
            }
        }
    }

    /// Context-switch wipe.
    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    pub fn module_selections(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .filter_map(|(tech, entry)| {
                entry
                    .selected_module_ids
                    .clone()
                    .map(|ids| (tech.clone(), ids))
            })
            .collect()
    }

    pub fn bonuses(&self) -> BTreeMap<String, TechBonus> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                entry.max_bonus.is_some()
                    || entry.solved_bonus.is_some()
                    || entry.solve_method.is_some()
            })
            .map(|(tech, entry)| {
                (
                    tech.clone(),
                    TechBonus {
                        max_bonus: entry.max_bonus,
                        solved_bonus: entry.solved_bonus,
                        solve_method: entry.solve_method.clone(),
                        bonus_status: entry.bonus_status,
                    },
                )
            })
            .collect()
    }

    /// Replaces every module selection with `selections`.
    pub fn restore_module_selections(&mut self, selections: BTreeMap<String, Vec<String>>) {
        for entry in self.entries.values_mut() {
            entry.selected_module_ids = None;
        }
        for (tech, ids) in selections {
            self.set_module_selection(&tech, ids);
        }
        self.entries.retain(|_, entry| !entry.is_blank());
    }

    /// Replaces every bonus annotation with `bonuses`; statuses are
    /// recomputed rather than trusted.
    pub fn restore_bonuses(&mut self, bonuses: BTreeMap<String, TechBonus>) {
        for entry in self.entries.values_mut() {
            entry.max_bonus = None;
            entry.solved_bonus = None;
            entry.solve_method = None;
            entry.bonus_status = None;
        }
        for (tech, bonus) in bonuses {
            let entry = self.entries.entry(tech).or_default();
            entry.max_bonus = bonus.max_bonus;
            entry.solved_bonus = bonus.solved_bonus;
            entry.solve_method = bonus.solve_method;
            Self::refresh_status(entry);
        }
        self.entries.retain(|_, entry| !entry.is_blank());
    }
}
