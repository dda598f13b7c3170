use crate::place::{FeatureCollection, TOP_TEN};
use std::cmp::Ordering;

/// Shared ordering for the map's top ten and the leaderboard.
///
/// Votes descending, then case-insensitive address, then id. The id step
/// keeps the order total so repeated computations agree even on duplicate
/// addresses.
pub fn compare_by_votes(
    votes_a: u64,
    address_a: &str,
    id_a: &str,
    votes_b: u64,
    address_b: &str,
    id_b: &str,
) -> Ordering {
    votes_b
        .cmp(&votes_a)
        .then_with(|| address_a.to_lowercase().cmp(&address_b.to_lowercase()))
        .then_with(|| id_a.cmp(id_b))
}

/// Recomputes `rank` on every feature from scratch.
///
/// The ten best features get contiguous ranks 1..=10; every other feature has
/// its rank cleared. Payload order is left untouched.
pub fn assign_ranks(collection: &mut FeatureCollection) {
    let mut order: Vec<usize> = (0..collection.features.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = &collection.features[a];
        let fb = &collection.features[b];
        compare_by_votes(
            fa.properties.votes,
            &fa.display_title(),
            fa.id(),
            fb.properties.votes,
            &fb.display_title(),
            fb.id(),
        )
    });

    for feature in collection.features.iter_mut() {
        feature.properties.rank = None;
    }
    for (position, &idx) in order.iter().take(TOP_TEN as usize).enumerate() {
        collection.features[idx].properties.rank = Some(position as u32 + 1);
    }
}
