//! Deterministic coordinator election (§4.5): every honest node, given the
//! same block height and the same Active validator set, computes the same
//! coordinator without any leader-election round trip.

/// Default width, in blocks, of one coordinator epoch. Overridable via
/// `USVL_COORDINATOR_RANGE` (§7.4).
pub const DEFAULT_COORDINATOR_RANGE: u64 = 100;

/// `epoch = height / coordinator_range`.
#[must_use]
pub fn epoch_for_height(height: u64, coordinator_range: u64) -> u64 {
    height / coordinator_range.max(1)
}

/// Returns the operator address of the coordinator for `epoch`, given the
/// Active validator set sorted by operator address. `index = epoch mod
/// |active|`. Returns `None` if the active set is empty (no coordinator can
/// be elected until the set is non-empty).
#[must_use]
pub fn coordinator_for_epoch<'a>(epoch: u64, active_sorted: &'a [String]) -> Option<&'a str> {
    if active_sorted.is_empty() {
        return None;
    }
    let index = (epoch % active_sorted.len() as u64) as usize;
    active_sorted.get(index).map(String::as_str)
}

/// Convenience: resolves the coordinator directly from a block height.
#[must_use]
pub fn coordinator_for_height<'a>(height: u64, coordinator_range: u64, active_sorted: &'a [String]) -> Option<&'a str> {
    coordinator_for_epoch(epoch_for_height(height, coordinator_range), active_sorted)
}
