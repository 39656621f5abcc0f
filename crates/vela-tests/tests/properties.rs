//! Protocol-wide invariants under randomized activity.

use proptest::prelude::*;

use vela_core::constants::{MAX_LOCK_DURATION, UNIT, WEEK};
use vela_core::types::{Address, PositionId};
use vela_protocol::Protocol;
use vela_tests::helpers::*;

/// One randomized lock: owner index, amount, duration, open offset.
fn lock_strategy() -> impl Strategy<Value = (usize, u128, u64, u64)> {
    (
        0usize..4,
        1u128..=1_000_000 * UNIT,
        WEEK * 2..=MAX_LOCK_DURATION,
        0u64..=6 * WEEK,
    )
}

fn accounts() -> [Address; 4] {
    [addr("a"), addr("b"), addr("c"), addr("d")]
}

/// Open `locks` in time order and return the protocol with their ids.
fn open_all(locks: &mut [(usize, u128, u64, u64)]) -> (Protocol, Vec<PositionId>) {
    let mut p = protocol();
    for who in accounts() {
        fund(&mut p, who, 10_000_000 * UNIT);
    }
    locks.sort_by_key(|l| l.3);
    let mut ids = Vec::new();
    for &(owner, amount, duration, offset) in locks.iter() {
        p.advance_to(GENESIS + offset).unwrap();
        let who = accounts()[owner];
        ids.push(p.create_lock(who, amount, duration, who).unwrap());
    }
    (p, ids)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn supply_matches_sum_of_balances(
        mut locks in prop::collection::vec(lock_strategy(), 1..8),
        probes in prop::collection::vec(0u64..=60 * WEEK, 1..6),
    ) {
        let (p, ids) = open_all(&mut locks);
        for dt in probes {
            let t = GENESIS + dt;
            let supply = p.total_supply_at(t).unwrap();
            let sum: u128 = ids.iter().map(|id| p.balance_of_at(*id, t).unwrap()).sum();
            // Each position floors separately; the aggregate floors once.
            prop_assert!(supply >= sum);
            prop_assert!(supply - sum <= ids.len() as u128);
        }
    }

    #[test]
    fn power_follows_linear_formula(
        amount in 1u128..=1_000_000_000 * UNIT,
        duration in WEEK..=MAX_LOCK_DURATION,
        elapsed in 0u64..=MAX_LOCK_DURATION,
    ) {
        let mut p = protocol();
        let alice = addr("alice");
        fund(&mut p, alice, amount);
        let id = p.create_lock(alice, amount, duration, alice).unwrap();
        let end = p.locked(id).unwrap().end;
        let t = GENESIS + elapsed;
        let expected = if t >= end {
            0
        } else {
            // amount <= 1e27 and the gap <= 3.2e7, so the product fits in u128.
            amount * u128::from(end - t) / u128::from(MAX_LOCK_DURATION)
        };
        prop_assert_eq!(p.balance_of_at(id, t).unwrap(), expected);
    }

    #[test]
    fn power_aggregates_linearly(
        a in 1u128..=1_000_000 * UNIT,
        b in 1u128..=1_000_000 * UNIT,
        duration in WEEK * 2..=MAX_LOCK_DURATION,
        offset in 0u64..WEEK,
        probes in prop::collection::vec(0u64..=MAX_LOCK_DURATION + WEEK, 1..8),
    ) {
        let owner = addr("alice");
        let mut pair = protocol();
        let mut single = protocol();
        fund(&mut pair, owner, a + b);
        fund(&mut single, owner, a + b);
        pair.advance_to(GENESIS + offset).unwrap();
        single.advance_to(GENESIS + offset).unwrap();
        let x = pair.create_lock(owner, a, duration, owner).unwrap();
        let y = pair.create_lock(owner, b, duration, owner).unwrap();
        let z = single.create_lock(owner, a + b, duration, owner).unwrap();

        for dt in probes {
            let t = GENESIS + dt;
            let split = pair.balance_of_at(x, t).unwrap() + pair.balance_of_at(y, t).unwrap();
            prop_assert!(split.abs_diff(single.balance_of_at(z, t).unwrap()) <= 1);
            prop_assert!(pair.total_supply_at(t).unwrap().abs_diff(single.total_supply_at(t).unwrap()) <= 1);
        }
    }

    #[test]
    fn history_is_immutable(
        mut locks in prop::collection::vec(lock_strategy(), 1..6),
        top_ups in prop::collection::vec((0usize..6, 1u128..=1_000 * UNIT), 0..4),
    ) {
        let (mut p, ids) = open_all(&mut locks);
        let horizon = p.now();
        let probes: Vec<_> = (0..=horizon - GENESIS)
            .step_by(WEEK as usize / 2)
            .map(|dt| GENESIS + dt)
            .collect();
        let before: Vec<_> = probes
            .iter()
            .map(|t| (p.total_supply_at(*t).unwrap(), ids.iter().map(|id| p.balance_of_at(*id, *t).unwrap()).collect::<Vec<_>>()))
            .collect();

        p.advance_to(horizon + WEEK).unwrap();
        for (idx, amount) in top_ups {
            let id = ids[idx % ids.len()];
            let owner = p.owner_of(id).unwrap();
            // Expired locks reject top-ups; that is fine here.
            let _ = p.deposit_for(owner, id, amount);
        }
        p.checkpoint().unwrap();

        for (t, (supply, balances)) in probes.iter().zip(before) {
            prop_assert_eq!(p.total_supply_at(*t).unwrap(), supply);
            let now: Vec<_> = ids.iter().map(|id| p.balance_of_at(*id, *t).unwrap()).collect();
            prop_assert_eq!(now, balances);
        }
    }

    #[test]
    fn claims_never_exceed_notified(
        stakes in prop::collection::vec(1u128..=1_000_000 * UNIT, 1..5),
        rewards in prop::collection::vec(1u128..=1_000_000 * UNIT, 1..6),
        claim_every in 1u64..=3,
    ) {
        let mut p = protocol();
        let mut ids = Vec::new();
        for (i, stake) in stakes.iter().enumerate() {
            let who = accounts()[i % 4];
            fund(&mut p, who, *stake);
            ids.push((who, p.create_permanent_lock(who, *stake, MAX_LOCK_DURATION, who).unwrap()));
        }

        let mut week = 0u64;
        for amount in &rewards {
            p.advance_to(GENESIS + week * WEEK + 1).unwrap();
            notify(&mut p, *amount);
            week += 1;
            p.advance_to(GENESIS + week * WEEK + 1).unwrap();
            if week % claim_every == 0 {
                for (who, id) in &ids {
                    p.claim_all(*who, *id).unwrap();
                }
            }
        }
        for (who, id) in &ids {
            p.claim_all(*who, *id).unwrap();
        }

        let notified: u128 = rewards.iter().sum();
        let totals = p.rewards().totals(usdc());
        prop_assert_eq!(totals.notified, notified);
        prop_assert!(totals.claimed <= notified);
        // Rounding strands less than one unit per position.
        prop_assert!(notified - totals.claimed <= ids.len() as u128);
        let custody = p.balance_of(usdc(), p.config().rewards_account);
        prop_assert_eq!(custody, totals.accounted());
    }

    #[test]
    fn rewards_follow_power_ratio(
        stake in 1u128..=1_000_000 * UNIT,
        ratio in 1u128..=8,
        reward in 1u128..=1_000_000 * UNIT,
    ) {
        let mut p = protocol();
        let (small, large) = (addr("small"), addr("large"));
        fund(&mut p, small, stake);
        fund(&mut p, large, stake * ratio);
        let a = p.create_permanent_lock(small, stake, MAX_LOCK_DURATION, small).unwrap();
        let b = p.create_permanent_lock(large, stake * ratio, MAX_LOCK_DURATION, large).unwrap();
        p.advance_to(GENESIS + 1).unwrap();
        notify(&mut p, reward);
        p.advance_to(GENESIS + WEEK + 1).unwrap();

        let got_a = p.earned(usdc(), a).unwrap();
        let got_b = p.earned(usdc(), b).unwrap();
        prop_assert!((got_a * ratio).abs_diff(got_b) <= ratio);
        prop_assert!(got_a + got_b <= reward);
    }
}
