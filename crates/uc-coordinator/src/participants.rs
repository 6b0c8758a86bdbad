//! Participant selection (§4.5, §9): who takes part in a given session.
//!
//! Key protocols (Keygen/Keyrefresh/QuorumChange) involve every eligible
//! validator -- Active and PendingJoin alike, since a joining validator
//! needs a keyshare before it can sign. Sign involves a deterministically
//! drawn threshold subset of the Active set only, so every honest node
//! agrees on the same signing group without a negotiation round trip.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::validator_set::ValidatorInfo;

/// The full eligible set for a key protocol: every Active and PendingJoin
/// operator address, sorted.
#[must_use]
pub fn eligible_participants(eligible: &[ValidatorInfo]) -> Vec<String> {
    let mut addrs: Vec<String> = eligible.iter().map(|v| v.operator_address.clone()).collect();
    addrs.sort();
    addrs
}

/// `threshold = ceil(2n/3) + 1`, the minimum subset size that guarantees
/// more than two-thirds of `n` active validators participate.
#[must_use]
pub fn threshold_for(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let t = (2 * n).div_ceil(3) + 1;
    t.min(n)
}

/// Deterministically draws a threshold-sized subset of `active` for signing
/// `event_id` at `epoch`. Every honest node computes the identical subset:
/// the PRNG is seeded from `sha256(event_id || epoch)`, and the shuffle
/// operates on the active set pre-sorted by operator address so node-local
/// ordering never leaks into the result.
#[must_use]
pub fn select_sign_subset(active: &[ValidatorInfo], event_id: &str, epoch: u64) -> Vec<String> {
    let mut addrs: Vec<String> = active.iter().map(|v| v.operator_address.clone()).collect();
    addrs.sort();

    let threshold = threshold_for(addrs.len());
    if threshold == 0 {
        return Vec::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(event_id.as_bytes());
    hasher.update(epoch.to_be_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);

    let mut rng = ChaCha20Rng::from_seed(seed);
    addrs.shuffle(&mut rng);
    addrs.truncate(threshold);
    addrs.sort();
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator_set::ValidatorStatus;

    fn validator(addr: &str, status: ValidatorStatus) -> ValidatorInfo {
        ValidatorInfo { operator_address: addr.into(), status, public_key_hex: "aa".into(), network_address: String::new() }
    }

    #[test]
    fn threshold_matches_more_than_two_thirds() {
        assert_eq!(threshold_for(1), 1);
        assert_eq!(threshold_for(3), 3);
        assert_eq!(threshold_for(4), 4);
        assert_eq!(threshold_for(6), 5);
        assert_eq!(threshold_for(9), 7);
        assert_eq!(threshold_for(100), 68);
    }

    #[test]
    fn eligible_participants_includes_pending_join() {
        let set = vec![
            validator("b", ValidatorStatus::Active),
            validator("a", ValidatorStatus::PendingJoin),
        ];
        assert_eq!(eligible_participants(&set), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn select_sign_subset_is_deterministic_across_calls() {
        let active: Vec<ValidatorInfo> =
            ["a", "b", "c", "d", "e", "f"].iter().map(|a| validator(a, ValidatorStatus::Active)).collect();

        let first = select_sign_subset(&active, "event-1", 7);
        let second = select_sign_subset(&active, "event-1", 7);
        assert_eq!(first, second);
        assert_eq!(first.len(), threshold_for(6));
    }

    #[test]
    fn select_sign_subset_varies_with_event_id_and_epoch() {
        let active: Vec<ValidatorInfo> =
            ["a", "b", "c", "d", "e", "f", "g", "h", "i"].iter().map(|a| validator(a, ValidatorStatus::Active)).collect();

        let by_event = select_sign_subset(&active, "event-1", 7);
        let other_event = select_sign_subset(&active, "event-2", 7);
        let other_epoch = select_sign_subset(&active, "event-1", 8);
        assert!(by_event != other_event || by_event != other_epoch);
    }

    #[test]
    fn select_sign_subset_ignores_pending_join() {
        let set =
            vec![validator("a", ValidatorStatus::Active), validator("b", ValidatorStatus::PendingJoin)];
        let subset = select_sign_subset(&set, "event-1", 1);
        assert_eq!(subset, vec!["a".to_string()]);
    }
}
