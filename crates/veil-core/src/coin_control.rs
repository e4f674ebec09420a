//! Caller overrides for coin selection and transaction creation

use crate::fees::FeeRate;
use crate::primitives::{OutPoint, Script};
use std::collections::BTreeSet;

/// Per-call selection and fee overrides.
#[derive(Debug, Clone, Default)]
pub struct CoinControl {
    /// Change destination; a fresh key is used when unset
    pub dest_change: Option<Script>,
    /// Fixed change position in the output list
    pub change_position: Option<usize>,
    /// With selected inputs, also allow the wallet to add more
    pub allow_other_inputs: bool,
    /// Include watch-only outputs in the candidate set
    pub allow_watch_only: bool,
    /// Fee rate overriding every other source
    pub fee_rate: Option<FeeRate>,
    /// Use `fee_rate` as given, skipping the wallet's minimum rate floors
    pub override_fee_rate: bool,
    /// Confirmation target for the chain estimate
    pub confirm_target: Option<u32>,
    /// Signal opt-in replace-by-fee; the wallet default applies when unset
    pub signal_rbf: Option<bool>,
    /// Spend every output sent to the same destination together
    pub avoid_partial_spends: bool,
    selected: BTreeSet<OutPoint>,
}

impl CoinControl {
    /// Default overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when any input was preselected.
    pub fn has_selected(&self) -> bool {
        !self.selected.is_empty()
    }

    /// True when `outpoint` was preselected.
    pub fn is_selected(&self, outpoint: &OutPoint) -> bool {
        self.selected.contains(outpoint)
    }

    /// Preselect an input.
    pub fn select(&mut self, outpoint: OutPoint) {
        self.selected.insert(outpoint);
    }

    /// Drop a preselected input.
    pub fn unselect(&mut self, outpoint: &OutPoint) {
        self.selected.remove(outpoint);
    }

    /// Drop every preselected input.
    pub fn unselect_all(&mut self) {
        self.selected.clear();
    }

    /// Preselected inputs in outpoint order.
    pub fn list_selected(&self) -> Vec<OutPoint> {
        self.selected.iter().copied().collect()
    }

    /// True when only preselected inputs may be spent.
    pub fn only_selected(&self) -> bool {
        self.has_selected() && !self.allow_other_inputs
    }
}
