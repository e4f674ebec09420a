//! Mint selection for zerocoin spends

use super::denomination::Denomination;
use super::mint::MintMeta;
use std::collections::{BTreeMap, HashSet};
use veil_params::Amount;

/// Outcome of [`select_mints_from_list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MintSelection {
    /// Chosen mints
    pub mints: Vec<MintMeta>,
    /// Total face value of `mints`
    pub selected_value: Amount,
    /// Transactions needed at the per-transaction spend limit
    pub needed_spends: usize,
}

impl MintSelection {
    fn from_mints(mints: Vec<MintMeta>, max_spends: usize) -> Self {
        let selected_value = mints.iter().map(|m| m.denom.amount()).sum();
        let needed_spends = if max_spends == 0 {
            0
        } else {
            mints.len().div_ceil(max_spends)
        };
        Self {
            mints,
            selected_value,
            needed_spends,
        }
    }

    fn change(&self, target: Amount) -> Amount {
        self.selected_value - target
    }
}

/// Choose mints covering `target` from `mints`, which must be sorted oldest first.
///
/// `held` caps how many mints of each denomination may be used. The greedy pass
/// walks denominations from the largest down; any shortfall is covered by the
/// smallest remaining mint that closes it. With `minimize_change` the
/// lower-change candidate wins, otherwise the one with fewer spends.
pub fn select_mints_from_list(
    target: Amount,
    max_spends: usize,
    minimize_change: bool,
    mints: &[MintMeta],
    held: &BTreeMap<Denomination, usize>,
) -> MintSelection {
    if target <= 0 || mints.is_empty() {
        return MintSelection::default();
    }

    let greedy = greedy_cover(target, mints, held);
    let single = single_cover(target, mints, held);

    let chosen = match (greedy, single) {
        (Some(g), Some(s)) => {
            let g = MintSelection::from_mints(g, max_spends);
            let s = MintSelection::from_mints(s, max_spends);
            let prefer_single = if minimize_change {
                (s.change(target), s.mints.len()) < (g.change(target), g.mints.len())
            } else {
                (s.mints.len(), s.change(target)) < (g.mints.len(), g.change(target))
            };
            if prefer_single {
                s
            } else {
                g
            }
        }
        (Some(g), None) => MintSelection::from_mints(g, max_spends),
        (None, Some(s)) => MintSelection::from_mints(s, max_spends),
        (None, None) => MintSelection::default(),
    };

    tracing::debug!(
        "Selected {} mints worth {} for target {} ({} spends)",
        chosen.mints.len(),
        chosen.selected_value,
        target,
        chosen.needed_spends
    );
    chosen
}

fn allowed(held: &BTreeMap<Denomination, usize>, denom: Denomination) -> usize {
    held.get(&denom).copied().unwrap_or(0)
}

fn greedy_cover(
    target: Amount,
    mints: &[MintMeta],
    held: &BTreeMap<Denomination, usize>,
) -> Option<Vec<MintMeta>> {
    let mut chosen: Vec<MintMeta> = Vec::new();
    let mut used: HashSet<usize> = HashSet::new();
    let mut remaining = target;

    for denom in Denomination::ALL.into_iter().rev() {
        let want = (remaining / denom.amount()) as usize;
        let take = want.min(allowed(held, denom));
        if take == 0 {
            continue;
        }
        let picked: Vec<usize> = mints
            .iter()
            .enumerate()
            .filter(|(i, m)| m.denom == denom && !used.contains(i))
            .map(|(i, _)| i)
            .take(take)
            .collect();
        for i in picked {
            used.insert(i);
            remaining -= denom.amount();
            chosen.push(mints[i].clone());
        }
    }

    // Close any shortfall with the smallest mint that covers it, else keep adding
    // the smallest available until covered.
    while remaining > 0 {
        let mut by_size: Vec<usize> = (0..mints.len())
            .filter(|i| !used.contains(i))
            .filter(|i| {
                let d = mints[*i].denom;
                chosen.iter().filter(|c| c.denom == d).count() < allowed(held, d)
            })
            .collect();
        if by_size.is_empty() {
            return None;
        }
        by_size.sort_by_key(|i| mints[*i].denom);
        let pick = by_size
            .iter()
            .copied()
            .find(|i| mints[*i].denom.amount() >= remaining)
            .or_else(|| by_size.first().copied())?;
        used.insert(pick);
        remaining -= mints[pick].denom.amount();
        chosen.push(mints[pick].clone());
    }
    Some(chosen)
}

fn single_cover(
    target: Amount,
    mints: &[MintMeta],
    held: &BTreeMap<Denomination, usize>,
) -> Option<Vec<MintMeta>> {
    mints
        .iter()
        .filter(|m| allowed(held, m.denom) > 0 && m.denom.amount() >= target)
        .min_by_key(|m| m.denom)
        .map(|m| vec![m.clone()])
}
