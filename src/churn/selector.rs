//! Weighted random choice over the actions available to a worker.

use rand::Rng;

use super::action::{Action, WeightTable};

/// Cumulative-weight table over a set of candidate actions.
///
/// Candidates with weight zero are dropped when the table is built, so they can never be picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightedSelector {
    /// `(action, running total including this action)` in insertion order.
    cumulative: Vec<(Action, u64)>,
}

impl WeightedSelector {
    /// Empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit `(action, weight)` pairs.
    pub fn from_weights(weights: impl IntoIterator<Item = (Action, u32)>) -> Self {
        let mut selector = Self::new();
        for (action, weight) in weights {
            selector.push(action, weight);
        }
        selector
    }

    /// Build from candidate actions, looking each weight up in `table`.
    pub fn from_candidates(candidates: &[Action], table: &WeightTable) -> Self {
        Self::from_weights(candidates.iter().map(|&a| (a, table.weight(a))))
    }

    /// Add one candidate.
    pub fn push(&mut self, action: Action, weight: u32) {
        if weight == 0 {
            return;
        }
        let total = self.total() + u64::from(weight);
        self.cumulative.push((action, total));
    }

    /// Sum of all candidate weights.
    pub fn total(&self) -> u64 {
        self.cumulative.last().map_or(0, |&(_, total)| total)
    }

    /// Number of candidates with non-zero weight.
    pub fn len(&self) -> usize {
        self.cumulative.len()
    }

    /// True when nothing can be picked.
    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }

    /// Resolve a draw in `0..total()` to the candidate whose weight band contains it.
    pub fn pick_with_draw(&self, draw: u64) -> Option<Action> {
        let index = self.cumulative.partition_point(|&(_, total)| total <= draw);
        self.cumulative.get(index).map(|&(action, _)| action)
    }

    /// Pick one candidate using a single uniform draw from `rng`.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Action> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        self.pick_with_draw(rng.gen_range(0..total))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn draws_map_onto_weight_bands() {
        let selector = WeightedSelector::from_weights([
            (Action::Wait, 2),
            (Action::AddFile, 3),
            (Action::AddDirectory, 1),
        ]);
        assert_eq!(selector.total(), 6);
        assert_eq!(selector.pick_with_draw(0), Some(Action::Wait));
        assert_eq!(selector.pick_with_draw(1), Some(Action::Wait));
        assert_eq!(selector.pick_with_draw(2), Some(Action::AddFile));
        assert_eq!(selector.pick_with_draw(4), Some(Action::AddFile));
        assert_eq!(selector.pick_with_draw(5), Some(Action::AddDirectory));
        assert_eq!(selector.pick_with_draw(6), None);
    }

    #[test]
    fn zero_weights_are_never_candidates() {
        let selector =
            WeightedSelector::from_weights([(Action::Wait, 0), (Action::AddFile, 1)]);
        assert_eq!(selector.len(), 1);
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(selector.pick(&mut rng), Some(Action::AddFile));
        }
    }

    #[test]
    fn empty_selector_picks_nothing() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert!(WeightedSelector::new().is_empty());
        assert_eq!(WeightedSelector::new().pick(&mut rng), None);
        let all_zero = WeightedSelector::from_candidates(&Action::ALL, &WeightTable::zeroed());
        assert_eq!(all_zero.pick(&mut rng), None);
    }

    #[test]
    fn same_seed_same_picks() {
        let selector = WeightedSelector::from_candidates(&Action::ALL, &WeightTable::default());
        let mut a = SmallRng::seed_from_u64(42);
        let mut b = SmallRng::seed_from_u64(42);
        let left: Vec<_> = (0..64).map(|_| selector.pick(&mut a)).collect();
        let right: Vec<_> = (0..64).map(|_| selector.pick(&mut b)).collect();
        assert_eq!(left, right);
    }

    proptest! {
        #[test]
        fn picks_stay_within_positive_candidates(
            weights in proptest::collection::vec(0u32..50, Action::ALL.len()),
            seed in any::<u64>(),
        ) {
            let selector = WeightedSelector::from_weights(
                Action::ALL.iter().copied().zip(weights.iter().copied()),
            );
            let mut rng = SmallRng::seed_from_u64(seed);
            match selector.pick(&mut rng) {
                Some(action) => {
                    let index = Action::ALL.iter().position(|&a| a == action).unwrap();
                    prop_assert!(weights[index] > 0);
                }
                None => prop_assert!(weights.iter().all(|&w| w == 0)),
            }
        }

        #[test]
        fn every_draw_below_total_resolves(
            weights in proptest::collection::vec(1u32..20, 1..8),
            draw_fraction in 0.0f64..1.0,
        ) {
            let selector = WeightedSelector::from_weights(
                Action::ALL.iter().copied().zip(weights.iter().copied()),
            );
            let draw = ((selector.total() as f64) * draw_fraction) as u64;
            prop_assert!(selector.pick_with_draw(draw.min(selector.total() - 1)).is_some());
        }
    }
}
