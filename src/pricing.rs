// 💵 Pricing Engine - Tiered per-vote rates
//
// Maps an approved-vote count to the rate earned for that vote.
// Accrual is additive: the k-th approval credits exactly rate(k).
// Earlier credits are never re-priced when a participant moves into
// a higher tier.

use serde::Serialize;

// ============================================================================
// TIER TABLE
// ============================================================================

/// One band of approved-vote counts sharing a per-vote rate.
///
/// `upper` is inclusive; `None` means the band is open-ended.
/// Amounts are in minor currency units (so'm).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tier {
    pub lower: u64,
    pub upper: Option<u64>,
    pub rate: i64,
}

/// Ordered tier table covering every positive vote count.
pub const TIERS: [Tier; 5] = [
    Tier { lower: 1, upper: Some(1), rate: 10_000 },
    Tier { lower: 2, upper: Some(2), rate: 12_000 },
    Tier { lower: 3, upper: Some(4), rate: 14_000 },
    Tier { lower: 5, upper: Some(10), rate: 20_000 },
    Tier { lower: 11, upper: None, rate: 25_000 },
];

// ============================================================================
// RATE LOOKUP
// ============================================================================

/// Rate for the vote that brings a participant's approved count to `n`.
///
/// `n` is 1-based. Counts of zero are clamped to the first tier so a
/// display path can never panic on an unregistered account.
pub fn rate(n: u64) -> i64 {
    let n = n.max(1);
    for tier in &TIERS {
        let above_lower = n >= tier.lower;
        let below_upper = tier.upper.map_or(true, |u| n <= u);
        if above_lower && below_upper {
            return tier.rate;
        }
    }
    // Table is exhaustive over positive integers; last band is open-ended.
    TIERS[TIERS.len() - 1].rate
}

/// Rate that will apply to the *next* approval after `approved_count`.
///
/// Display only. Has no effect on accrual.
pub fn next_rate(approved_count: u64) -> i64 {
    rate(approved_count + 1)
}

/// Price schedule lines for menu copy (registration and balance view).
pub fn schedule_lines() -> Vec<String> {
    TIERS
        .iter()
        .map(|tier| {
            let band = match tier.upper {
                Some(u) if u == tier.lower => format!("vote {}", tier.lower),
                Some(u) => format!("votes {}-{}", tier.lower, u),
                None => format!("votes {}+", tier.lower),
            };
            format!("{}: {} so'm each", band, tier.rate)
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_tier_boundaries() {
        assert_eq!(rate(1), 10_000);
        assert_eq!(rate(2), 12_000);
        assert_eq!(rate(3), 14_000);
        assert_eq!(rate(4), 14_000);
        assert_eq!(rate(5), 20_000);
        assert_eq!(rate(10), 20_000);
        assert_eq!(rate(11), 25_000);
        assert_eq!(rate(1_000), 25_000);
    }

    #[test]
    fn test_rate_covers_all_positive_counts() {
        // No gap anywhere in the first few hundred counts
        for n in 1..=500u64 {
            assert!(rate(n) > 0, "no rate for count {}", n);
        }
    }

    #[test]
    fn test_rate_clamps_zero() {
        assert_eq!(rate(0), 10_000);
    }

    #[test]
    fn test_next_rate_preview() {
        // After the 2nd approval the 3rd vote is worth the 3-4 band rate
        assert_eq!(next_rate(2), 14_000);
        assert_eq!(next_rate(0), 10_000);
        assert_eq!(next_rate(10), 25_000);
    }

    #[test]
    fn test_additive_ladder() {
        // Balance after approvals 1..5 under additive accrual
        let mut balance = 0i64;
        let expected = [10_000, 22_000, 36_000, 50_000, 70_000];
        for (k, want) in (1u64..=5).zip(expected) {
            balance += rate(k);
            assert_eq!(balance, want);
        }
    }

    #[test]
    fn test_schedule_lines_cover_all_tiers() {
        let lines = schedule_lines();
        assert_eq!(lines.len(), TIERS.len());
        assert_eq!(lines[0], "vote 1: 10000 so'm each");
        assert_eq!(lines[4], "votes 11+: 25000 so'm each");
    }
}
