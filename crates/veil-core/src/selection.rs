//! Coin selection algorithms for transaction building
//!
//! Implements branch-and-bound exact matching with a knapsack fallback, run
//! through a ladder of progressively looser eligibility filters.

use crate::available::OutputCandidate;
use crate::chain::Chain;
use crate::coin_control::CoinControl;
use crate::fees::FeeRate;
use crate::keystore::p2pk_input_size;
use crate::primitives::{OutPoint, Script};
use crate::wallet::Wallet;
use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashSet};
use veil_params::policy::MIN_CHANGE;
use veil_params::{Amount, MAX_MONEY};

/// Most outputs grouped together for one destination
pub const OUTPUT_GROUP_MAX_ENTRIES: usize = 10;

/// Branch-and-bound search budget
pub const TOTAL_TRIES: usize = 100_000;

/// Knapsack subset search iterations
pub const KNAPSACK_ITERATIONS: usize = 1000;

/// A coin chosen as a transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputCoin {
    /// Outpoint spent
    pub outpoint: OutPoint,
    /// Output value
    pub value: Amount,
    /// Value minus the fee for spending it
    pub effective_value: Amount,
    /// Estimated input size
    pub input_bytes: usize,
    /// Locking script
    pub script: Script,
}

impl InputCoin {
    /// Input for a filter-engine candidate.
    pub fn from_candidate(candidate: &OutputCandidate) -> Self {
        Self {
            outpoint: candidate.outpoint,
            value: candidate.value,
            effective_value: candidate.value,
            input_bytes: candidate.input_bytes,
            script: candidate.script.clone().unwrap_or_default(),
        }
    }
}

/// Outputs that are selected together.
#[derive(Debug, Clone, Default)]
pub struct OutputGroup {
    /// Member coins
    pub outputs: Vec<InputCoin>,
    /// Every member came from our own transactions
    pub from_me: bool,
    /// Sum of member values
    pub value: Amount,
    /// Shallowest member depth
    pub depth: i32,
    /// Summed mempool ancestors
    pub ancestors: usize,
    /// Largest mempool descendant count
    pub descendants: usize,
    /// Sum of member effective values
    pub effective_value: Amount,
    /// Fee to spend every member at the effective rate
    pub fee: Amount,
    /// Fee to spend every member at the long-term rate
    pub long_term_fee: Amount,
}

impl OutputGroup {
    fn new() -> Self {
        Self {
            from_me: true,
            depth: i32::MAX,
            ..Self::default()
        }
    }

    /// Add a coin to the group.
    pub fn insert(
        &mut self,
        coin: InputCoin,
        depth: i32,
        from_me: bool,
        ancestors: usize,
        descendants: usize,
    ) {
        self.value += coin.value;
        self.effective_value += coin.effective_value;
        self.outputs.push(coin);
        self.from_me &= from_me;
        self.depth = self.depth.min(depth);
        self.ancestors += ancestors;
        self.descendants = self.descendants.max(descendants);
    }

    /// True when the group passes `filter`.
    pub fn eligible(&self, filter: &EligibilityFilter) -> bool {
        let required = if self.from_me {
            filter.conf_mine
        } else {
            filter.conf_theirs
        };
        self.depth >= required
            && self.ancestors <= filter.max_ancestors
            && self.descendants <= filter.max_descendants
    }

    /// Copy of the group valued at `effective` with fees attached.
    ///
    /// Members that cost more to spend than they are worth are dropped; `None`
    /// when nothing is left.
    pub fn with_fees(&self, effective: FeeRate, long_term: FeeRate) -> Option<OutputGroup> {
        let mut group = OutputGroup {
            outputs: Vec::with_capacity(self.outputs.len()),
            value: 0,
            effective_value: 0,
            fee: 0,
            long_term_fee: 0,
            ..self.clone()
        };
        for coin in &self.outputs {
            let fee = effective.fee(coin.input_bytes);
            let effective_value = coin.value - fee;
            if effective_value <= 0 {
                continue;
            }
            group.value += coin.value;
            group.effective_value += effective_value;
            group.fee += fee;
            group.long_term_fee += long_term.fee(coin.input_bytes);
            group.outputs.push(InputCoin {
                effective_value,
                ..coin.clone()
            });
        }
        (!group.outputs.is_empty()).then_some(group)
    }
}

/// Confirmation and mempool-chain requirements for a selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityFilter {
    /// Confirmations required for our own outputs
    pub conf_mine: i32,
    /// Confirmations required for outputs from others
    pub conf_theirs: i32,
    /// Mempool ancestor ceiling
    pub max_ancestors: usize,
    /// Mempool descendant ceiling
    pub max_descendants: usize,
}

impl EligibilityFilter {
    /// Filter with equal ancestor and descendant ceilings.
    pub fn new(conf_mine: i32, conf_theirs: i32, max_ancestors: usize) -> Self {
        Self {
            conf_mine,
            conf_theirs,
            max_ancestors,
            max_descendants: max_ancestors,
        }
    }

    /// Filter with distinct ceilings.
    pub fn with_descendants(
        conf_mine: i32,
        conf_theirs: i32,
        max_ancestors: usize,
        max_descendants: usize,
    ) -> Self {
        Self {
            conf_mine,
            conf_theirs,
            max_ancestors,
            max_descendants,
        }
    }
}

/// Size and fee inputs to a selection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinSelectionParams {
    /// Try branch-and-bound first
    pub use_bnb: bool,
    /// Size of a change output
    pub change_output_size: usize,
    /// Size of the input that later spends the change
    pub change_spend_size: usize,
    /// Rate the transaction pays
    pub effective_fee: FeeRate,
    /// Rate used to value future spends
    pub long_term_fee: FeeRate,
    /// Size of the transaction without inputs
    pub tx_noinputs_size: usize,
}

/// Coins chosen for a target.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    /// Selected coins, preset inputs first
    pub coins: Vec<InputCoin>,
    /// Sum of selected values
    pub value: Amount,
    /// Branch-and-bound produced the selection
    pub used_bnb: bool,
}

/// Group candidates for selection.
///
/// With `separate`, every output is its own group. Otherwise outputs to the
/// same script are grouped, at most [`OUTPUT_GROUP_MAX_ENTRIES`] per group.
pub fn group_outputs(candidates: &[OutputCandidate], separate: bool) -> Vec<OutputGroup> {
    if separate {
        return candidates
            .iter()
            .map(|c| {
                let mut group = OutputGroup::new();
                group.insert(
                    InputCoin::from_candidate(c),
                    c.depth,
                    c.from_me,
                    c.ancestors,
                    c.descendants,
                );
                group
            })
            .collect();
    }

    let mut open: BTreeMap<Vec<u8>, OutputGroup> = BTreeMap::new();
    let mut groups = Vec::new();
    for c in candidates {
        let key = c
            .script
            .as_ref()
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();
        let group = open.entry(key).or_insert_with(OutputGroup::new);
        if group.outputs.len() >= OUTPUT_GROUP_MAX_ENTRIES {
            groups.push(std::mem::replace(group, OutputGroup::new()));
        }
        group.insert(
            InputCoin::from_candidate(c),
            c.depth,
            c.from_me,
            c.ancestors,
            c.descendants,
        );
    }
    groups.extend(open.into_values().filter(|g| !g.outputs.is_empty()));
    groups
}

fn flatten(groups: &[&OutputGroup]) -> Vec<InputCoin> {
    groups
        .iter()
        .flat_map(|g| g.outputs.iter().cloned())
        .collect()
}

/// Branch-and-bound search for a changeless selection.
///
/// Looks for a subset whose effective value lands in
/// `[target, target + cost_of_change]` with the least waste. Returns the coins
/// and their plain value.
pub fn select_coins_bnb(
    groups: &[OutputGroup],
    target: Amount,
    cost_of_change: Amount,
) -> Option<(Vec<InputCoin>, Amount)> {
    let mut pool: Vec<&OutputGroup> = groups.iter().collect();
    let mut available: Amount = pool.iter().map(|g| g.effective_value).sum();
    if available < target {
        return None;
    }
    pool.sort_by(|a, b| b.effective_value.cmp(&a.effective_value));

    let mut selection: Vec<bool> = Vec::with_capacity(pool.len());
    let mut best: Vec<bool> = Vec::new();
    let mut value: Amount = 0;
    let mut waste: Amount = 0;
    let mut best_waste = MAX_MONEY;
    let waste_grows = pool
        .first()
        .is_some_and(|g| g.fee - g.long_term_fee > 0);

    for _ in 0..TOTAL_TRIES {
        let mut backtrack = false;
        if value + available < target
            || value > target + cost_of_change
            || (waste > best_waste && waste_grows)
        {
            backtrack = true;
        } else if value >= target {
            let total_waste = waste + (value - target);
            if total_waste <= best_waste {
                best = selection.clone();
                best.resize(pool.len(), false);
                best_waste = total_waste;
            }
            backtrack = true;
        }

        if backtrack {
            while selection.last() == Some(&false) {
                selection.pop();
                available += pool[selection.len()].effective_value;
            }
            let Some(last) = selection.last_mut() else {
                break;
            };
            *last = false;
            let group = pool[selection.len() - 1];
            value -= group.effective_value;
            waste -= group.fee - group.long_term_fee;
        } else {
            let group = pool[selection.len()];
            available -= group.effective_value;
            let skip_equivalent = selection.last() == Some(&false) && {
                let prev = pool[selection.len() - 1];
                group.effective_value == prev.effective_value && group.fee == prev.fee
            };
            if skip_equivalent {
                selection.push(false);
            } else {
                selection.push(true);
                value += group.effective_value;
                waste += group.fee - group.long_term_fee;
            }
        }
    }

    if best.is_empty() {
        return None;
    }
    let chosen: Vec<&OutputGroup> = pool
        .iter()
        .zip(&best)
        .filter(|(_, picked)| **picked)
        .map(|(g, _)| *g)
        .collect();
    let total = chosen.iter().map(|g| g.value).sum();
    Some((flatten(&chosen), total))
}

/// Randomized subset search for the smallest sum reaching `target`.
///
/// `groups` must be sorted by descending value. Returns the inclusion mask and
/// its sum; the sum stays `total_lower` when no better subset is found.
pub fn approximate_best_subset(
    groups: &[&OutputGroup],
    total_lower: Amount,
    target: Amount,
    iterations: usize,
) -> (Vec<bool>, Amount) {
    let mut rng = rand::thread_rng();
    let mut best = vec![true; groups.len()];
    let mut best_value = total_lower;

    for _ in 0..iterations {
        if best_value == target {
            break;
        }
        let mut included = vec![false; groups.len()];
        let mut total: Amount = 0;
        let mut reached = false;
        for pass in 0..2 {
            if reached {
                break;
            }
            for i in 0..groups.len() {
                let take = if pass == 0 {
                    rng.gen_bool(0.5)
                } else {
                    !included[i]
                };
                if !take {
                    continue;
                }
                total += groups[i].value;
                included[i] = true;
                if total >= target {
                    reached = true;
                    if total < best_value {
                        best_value = total;
                        best = included.clone();
                    }
                    total -= groups[i].value;
                    included[i] = false;
                }
            }
        }
    }
    (best, best_value)
}

/// Knapsack selection on plain values.
pub fn knapsack_solver(groups: &[OutputGroup], target: Amount) -> Option<(Vec<InputCoin>, Amount)> {
    let mut shuffled: Vec<&OutputGroup> = groups.iter().collect();
    shuffled.shuffle(&mut rand::thread_rng());

    let mut lowest_larger: Option<&OutputGroup> = None;
    let mut applicable: Vec<&OutputGroup> = Vec::new();
    let mut total_lower: Amount = 0;

    for group in shuffled {
        if group.value == target {
            return Some((group.outputs.clone(), group.value));
        } else if group.value < target + MIN_CHANGE {
            total_lower += group.value;
            applicable.push(group);
        } else if lowest_larger.map_or(true, |l| group.value < l.value) {
            lowest_larger = Some(group);
        }
    }

    if total_lower == target {
        return Some((flatten(&applicable), total_lower));
    }
    if total_lower < target {
        return lowest_larger.map(|l| (l.outputs.clone(), l.value));
    }

    applicable.sort_by(|a, b| b.value.cmp(&a.value));
    let (mut best, mut best_value) =
        approximate_best_subset(&applicable, total_lower, target, KNAPSACK_ITERATIONS);
    if best_value != target && total_lower >= target + MIN_CHANGE {
        (best, best_value) = approximate_best_subset(
            &applicable,
            total_lower,
            target + MIN_CHANGE,
            KNAPSACK_ITERATIONS,
        );
    }

    if let Some(larger) = lowest_larger {
        if (best_value != target && best_value < target + MIN_CHANGE) || larger.value <= best_value {
            return Some((larger.outputs.clone(), larger.value));
        }
    }

    let chosen: Vec<&OutputGroup> = applicable
        .iter()
        .zip(&best)
        .filter(|(_, picked)| **picked)
        .map(|(g, _)| *g)
        .collect();
    tracing::debug!("Knapsack selected {} groups worth {}", chosen.len(), best_value);
    Some((flatten(&chosen), best_value))
}

/// Run one filter pass. Returns the coins, their value and whether BnB found them.
pub fn select_coins_min_conf(
    target: Amount,
    filter: &EligibilityFilter,
    groups: &[OutputGroup],
    params: &CoinSelectionParams,
) -> Option<(Vec<InputCoin>, Amount, bool)> {
    let eligible = groups.iter().filter(|g| g.eligible(filter));

    if params.use_bnb {
        let cost_of_change = params.long_term_fee.fee(params.change_spend_size)
            + params.effective_fee.fee(params.change_output_size);
        let not_input_fees = params.effective_fee.fee(params.tx_noinputs_size);
        let valued: Vec<OutputGroup> = eligible
            .filter_map(|g| g.with_fees(params.effective_fee, params.long_term_fee))
            .collect();
        select_coins_bnb(&valued, target + not_input_fees, cost_of_change)
            .map(|(coins, value)| (coins, value, true))
    } else {
        let eligible: Vec<OutputGroup> = eligible.cloned().collect();
        knapsack_solver(&eligible, target).map(|(coins, value)| (coins, value, false))
    }
}

impl Wallet {
    /// Eligibility filters in the order selection tries them.
    pub fn eligibility_filters(&self) -> Vec<EligibilityFilter> {
        let max_anc = self.config.limit_ancestor_count;
        let max_desc = self.config.limit_descendant_count;
        let mut filters = vec![EligibilityFilter::new(1, 6, 0), EligibilityFilter::new(1, 1, 0)];
        if self.config.spend_zero_conf_change {
            filters.push(EligibilityFilter::new(0, 1, 2));
            filters.push(EligibilityFilter::with_descendants(
                0,
                1,
                4.min(max_anc / 3),
                4.min(max_desc / 3),
            ));
            filters.push(EligibilityFilter::with_descendants(0, 1, max_anc / 2, max_desc / 2));
            filters.push(EligibilityFilter::with_descendants(
                0,
                1,
                max_anc.saturating_sub(1),
                max_desc.saturating_sub(1),
            ));
            if !self.config.reject_long_chains {
                filters.push(EligibilityFilter::new(0, 1, usize::MAX));
            }
        }
        filters
    }

    /// Select coins from `available` worth at least `target`.
    pub fn select_coins(
        &self,
        chain: &dyn Chain,
        available: &[OutputCandidate],
        target: Amount,
        coin_control: Option<&CoinControl>,
        params: &CoinSelectionParams,
    ) -> Result<SelectionResult> {
        let spendable: Vec<&OutputCandidate> = available.iter().filter(|c| c.spendable).collect();
        let selected = coin_control.map(|cc| cc.list_selected()).unwrap_or_default();
        for outpoint in &selected {
            if self.is_locked_coin(outpoint) {
                return Err(Error::InvalidInput(format!("Preset input {} is locked", outpoint)));
            }
            if self.is_spent(chain, outpoint) {
                return Err(Error::InvalidInput(format!(
                    "Preset input {} is already spent",
                    outpoint
                )));
            }
        }

        if let Some(cc) = coin_control.filter(|cc| cc.only_selected()) {
            let coins: Vec<InputCoin> = spendable
                .iter()
                .filter(|c| cc.is_selected(&c.outpoint))
                .map(|c| InputCoin::from_candidate(c))
                .collect();
            let value: Amount = coins.iter().map(|c| c.value).sum();
            if value < target {
                return Err(Error::InsufficientFunds(format!(
                    "Selected inputs worth {} do not cover {}",
                    value, target
                )));
            }
            return Ok(SelectionResult {
                coins,
                value,
                used_bnb: false,
            });
        }

        let mut params = *params;
        let mut preset = Vec::new();
        let mut preset_value: Amount = 0;
        let mut preset_outpoints = HashSet::new();
        for outpoint in selected {
            let (value, script) = self
                .txs
                .get(&outpoint.hash)
                .and_then(|wtx| {
                    let output = wtx.tx.outputs().get(outpoint.n as usize)?;
                    let value = self.output_value(&outpoint.hash, outpoint.n, output);
                    Some((value, output.script_pubkey().cloned().unwrap_or_default()))
                })
                .ok_or_else(|| {
                    Error::InvalidInput(format!("Preset input {} not in wallet", outpoint))
                })?;
            preset_value += value;
            preset_outpoints.insert(outpoint);
            preset.push(InputCoin {
                outpoint,
                value,
                effective_value: value,
                input_bytes: p2pk_input_size(),
                script,
            });
        }
        if !preset.is_empty() {
            params.use_bnb = false;
        }

        let mut candidates: Vec<OutputCandidate> = spendable
            .into_iter()
            .filter(|c| !preset_outpoints.contains(&c.outpoint))
            .cloned()
            .collect();
        let avoid_partial = coin_control.is_some_and(|cc| cc.avoid_partial_spends);
        if avoid_partial && candidates.len() > OUTPUT_GROUP_MAX_ENTRIES {
            candidates.shuffle(&mut rand::thread_rng());
        }
        let groups = group_outputs(&candidates, !avoid_partial);

        let remaining = (target - preset_value).max(0);
        let mut found = None;
        if remaining == 0 && !preset.is_empty() {
            found = Some((Vec::new(), 0, false));
        } else {
            for filter in self.eligibility_filters() {
                if let Some(result) = select_coins_min_conf(remaining, &filter, &groups, &params) {
                    tracing::debug!(
                        "Selection pass {:?} found {} coins (bnb={})",
                        filter,
                        result.0.len(),
                        result.2
                    );
                    found = Some(result);
                    break;
                }
            }
        }

        let Some((coins, value, used_bnb)) = found else {
            return Err(Error::InsufficientFunds(format!(
                "No coin combination covers {}",
                target
            )));
        };

        let mut all = preset;
        all.extend(coins);
        Ok(SelectionResult {
            coins: all,
            value: value + preset_value,
            used_bnb,
        })
    }
}
