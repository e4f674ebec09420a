//! Zerocoin denominations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use veil_params::{Amount, COIN};

/// Fixed zerocoin face values, in whole coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum Denomination {
    /// 10 coins
    Ten = 10,
    /// 100 coins
    OneHundred = 100,
    /// 1000 coins
    OneThousand = 1000,
    /// 10000 coins
    TenThousand = 10000,
}

impl Denomination {
    /// Every denomination, smallest first.
    pub const ALL: [Denomination; 4] = [
        Denomination::Ten,
        Denomination::OneHundred,
        Denomination::OneThousand,
        Denomination::TenThousand,
    ];

    /// Face value in whole coins.
    pub const fn value(self) -> u32 {
        self as u32
    }

    /// Face value in satoshis.
    pub const fn amount(self) -> Amount {
        self as u32 as Amount * COIN
    }

    /// Denomination with the given whole-coin value.
    pub fn from_value(value: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.value() == value)
    }

    /// Most mints of this denomination worth holding before the next one up.
    pub fn max_coins(self) -> usize {
        match self {
            Denomination::Ten | Denomination::OneHundred | Denomination::OneThousand => 9,
            Denomination::TenThousand => 2,
        }
    }

    /// Position in [`Denomination::ALL`].
    pub fn index(self) -> usize {
        match self {
            Denomination::Ten => 0,
            Denomination::OneHundred => 1,
            Denomination::OneThousand => 2,
            Denomination::TenThousand => 3,
        }
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for Denomination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::from_value)
            .ok_or_else(|| format!("invalid zerocoin denomination: {}", s))
    }
}

/// Denomination whose face value equals `amount` exactly.
pub fn amount_to_denomination(amount: Amount) -> Option<Denomination> {
    if amount <= 0 || amount % COIN != 0 {
        return None;
    }
    let coins = u32::try_from(amount / COIN).ok()?;
    Denomination::from_value(coins)
}

/// Largest denomination not above `amount`, with the whole-coin remainder in satoshis.
///
/// Amounts below the smallest denomination return `None`.
pub fn amount_to_closest_denomination(amount: Amount) -> (Option<Denomination>, Amount) {
    let coins = amount / COIN;
    if coins < Denomination::Ten.value() as Amount {
        return (None, coins.max(0) * COIN);
    }
    let denom = Denomination::ALL
        .into_iter()
        .rev()
        .find(|d| d.value() as Amount <= coins)
        .unwrap_or(Denomination::Ten);
    (Some(denom), (coins - denom.value() as Amount) * COIN)
}

/// Split `amount` into mint denominations, largest first. Sub-denomination value is dropped.
pub fn denominations_for_amount(amount: Amount) -> Vec<Denomination> {
    let mut out = Vec::new();
    let mut remaining = amount;
    while let (Some(denom), _) = amount_to_closest_denomination(remaining) {
        out.push(denom);
        remaining -= denom.amount();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_denomination() {
        assert_eq!(amount_to_denomination(10 * COIN), Some(Denomination::Ten));
        assert_eq!(
            amount_to_denomination(10_000 * COIN),
            Some(Denomination::TenThousand)
        );
        assert_eq!(amount_to_denomination(11 * COIN), None);
        assert_eq!(amount_to_denomination(10 * COIN + 1), None);
    }

    #[test]
    fn test_closest_denomination() {
        assert_eq!(
            amount_to_closest_denomination(150 * COIN),
            (Some(Denomination::OneHundred), 50 * COIN)
        );
        assert_eq!(
            amount_to_closest_denomination(25_000 * COIN),
            (Some(Denomination::TenThousand), 15_000 * COIN)
        );
        assert_eq!(amount_to_closest_denomination(9 * COIN).0, None);
    }

    #[test]
    fn test_split() {
        let split = denominations_for_amount(1_230 * COIN);
        assert_eq!(
            split,
            vec![
                Denomination::OneThousand,
                Denomination::OneHundred,
                Denomination::OneHundred,
                Denomination::Ten,
                Denomination::Ten,
                Denomination::Ten
            ]
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("100".parse::<Denomination>(), Ok(Denomination::OneHundred));
        assert!("5".parse::<Denomination>().is_err());
    }
}
