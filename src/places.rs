use rand::Rng;
use rand::seq::IndexedRandom;
use std::sync::Arc;

use crate::error::NothingToDo;
use crate::place::Place;

// Shared by clones; only `Places::add` copies it.
#[derive(Debug, Clone, Default)]
struct Topology {
    neighbors: Vec<Vec<usize>>,
    moveable: Vec<usize>,
    is_moveable: Vec<bool>,
}

impl Topology {
    fn mark_moveable(&mut self, index: usize) {
        if !self.is_moveable[index] {
            self.is_moveable[index] = true;
            self.moveable.push(index);
        }
    }
}

/// `energy` is kept incrementally and always equals placement energies plus
/// the overlap energy of every neighbour pair.
#[derive(Debug, Clone, Default)]
pub struct Places {
    places: Vec<Place>,
    topology: Arc<Topology>,
    energy: f64,
    previous: Option<Arc<Places>>,
}

impl Places {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, place: Place) {
        let index = self.places.len();
        let topology = Arc::make_mut(&mut self.topology);
        topology.neighbors.push(Vec::new());
        topology.is_moveable.push(false);

        for (other_index, other) in self.places.iter().enumerate() {
            if !place.can_overlap(other) {
                continue;
            }
            topology.neighbors[index].push(other_index);
            topology.neighbors[other_index].push(index);
            topology.mark_moveable(index);
            topology.mark_moveable(other_index);
            self.energy += place.overlap_energy(other);
        }

        self.energy += place.placement_energy();
        self.places.push(place);
    }

    pub fn move_label<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<(), NothingToDo> {
        let Some(&index) = self.topology.moveable.choose(rng) else {
            return Err(NothingToDo);
        };
        self.energy -= self.local_energy(index);
        self.places[index].move_label(rng);
        self.energy += self.local_energy(index);
        Ok(())
    }

    fn local_energy(&self, index: usize) -> f64 {
        let place = &self.places[index];
        let overlaps: f64 = self.topology.neighbors[index]
            .iter()
            .map(|&other| place.overlap_energy(&self.places[other]))
            .sum();
        place.placement_energy() + overlaps
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn recompute_energy(&self) -> f64 {
        let mut energy: f64 = self.places.iter().map(Place::placement_energy).sum();
        for (index, neighbors) in self.topology.neighbors.iter().enumerate() {
            for &other in neighbors.iter().filter(|&&other| other > index) {
                energy += self.places[index].overlap_energy(&self.places[other]);
            }
        }
        energy
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Place> {
        self.places.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Place> {
        self.places.get(index)
    }

    pub fn as_slice(&self) -> &[Place] {
        &self.places
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.topology
            .neighbors
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_moveable(&self, index: usize) -> bool {
        self.topology.is_moveable.get(index).copied().unwrap_or(false)
    }

    pub fn moveable(&self) -> &[usize] {
        &self.topology.moveable
    }

    /// Link the current state as the predecessor of whatever comes next.
    pub fn remember(&mut self) {
        let snapshot = self.clone();
        self.previous = Some(Arc::new(snapshot));
    }

    pub fn previous(&self) -> Option<&Places> {
        self.previous.as_deref()
    }

    /// Newest first.
    pub fn history(&self) -> impl Iterator<Item = &Places> {
        std::iter::successors(Some(self), |places| places.previous())
    }
}

impl<'a> IntoIterator for &'a Places {
    type Item = &'a Place;
    type IntoIter = std::slice::Iter<'a, Place>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Place> for Places {
    fn from_iter<I: IntoIterator<Item = Place>>(iter: I) -> Self {
        let mut places = Places::new();
        for place in iter {
            places.add(place);
        }
        places
    }
}

// Unlink long histories one node at a time instead of recursing.
impl Drop for Places {
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(link) = next {
            next = match Arc::try_unwrap(link) {
                Ok(mut places) => places.previous.take(),
                Err(_) => None,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlacementConfig;
    use crate::place::Placement;
    use crate::place::tests::{place, seed};
    use crate::text_metrics::LabelSize;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type Anchor = (f64, f64, f64, f64, u32);

    fn cluster(count: usize) -> Places {
        (0..count)
            .map(|i| place(&format!("P{i}"), i as f64 * 30.0, (i % 3) as f64 * 10.0))
            .collect()
    }

    // Anchors dense enough that most places have neighbours.
    fn anchors() -> impl Strategy<Value = Vec<Anchor>> {
        prop::collection::vec(
            (0.0f64..240.0, 0.0f64..240.0, 4.0f64..80.0, 6.0f64..24.0, 0u32..5),
            0..24,
        )
    }

    fn scattered(anchors: &[Anchor]) -> Places {
        anchors
            .iter()
            .enumerate()
            .map(|(i, &(x, y, width, height, rank))| {
                let mut s = seed(&format!("P{i}"), x, y);
                s.size = LabelSize::new(width, height);
                s.rank = rank;
                Place::new(s, &PlacementConfig::default()).expect("valid place")
            })
            .collect()
    }

    fn drift(places: &Places) -> f64 {
        (places.energy() - places.recompute_energy()).abs()
    }

    fn assert_consistent(places: &Places) {
        let fresh = places.recompute_energy();
        assert!(
            (places.energy() - fresh).abs() < 1e-9,
            "incremental energy {} drifted from {}",
            places.energy(),
            fresh
        );
    }

    proptest! {
        #[test]
        fn energy_matches_recomputation_after_moves(
            anchors in anchors(),
            moves in 0usize..300,
            rng_seed in any::<u64>(),
        ) {
            let mut places = scattered(&anchors);
            prop_assert!(drift(&places) < 1e-6);
            let mut rng = StdRng::seed_from_u64(rng_seed);
            for step in 0..moves {
                if places.move_label(&mut rng).is_err() {
                    prop_assert!(places.moveable().is_empty());
                    break;
                }
                prop_assert!(
                    drift(&places) < 1e-6,
                    "energy {} drifted from {} after {} moves",
                    places.energy(),
                    places.recompute_energy(),
                    step + 1
                );
            }
        }

        #[test]
        fn clones_are_independent(
            anchors in anchors(),
            moves in 1usize..200,
            rng_seed in any::<u64>(),
        ) {
            let original = scattered(&anchors);
            let energy = original.energy();
            let placements: Vec<Placement> = original.iter().map(Place::placement).collect();
            let degrees: Vec<usize> = (0..original.len()).map(|i| original.neighbors(i).len()).collect();

            let mut copy = original.clone();
            let mut rng = StdRng::seed_from_u64(rng_seed);
            for _ in 0..moves {
                if copy.move_label(&mut rng).is_err() {
                    break;
                }
            }
            copy.add(place("Late", 120.0, 120.0));

            prop_assert_eq!(original.energy(), energy);
            prop_assert_eq!(original.len(), anchors.len());
            prop_assert_eq!(copy.len(), anchors.len() + 1);
            let after: Vec<Placement> = original.iter().map(Place::placement).collect();
            prop_assert_eq!(after, placements);
            let degrees_after: Vec<usize> =
                (0..original.len()).map(|i| original.neighbors(i).len()).collect();
            prop_assert_eq!(degrees_after, degrees);
            prop_assert!(drift(&original) < 1e-6);
            prop_assert!(drift(&copy) < 1e-6);
        }
    }

    #[test]
    fn clustered_places_start_with_overlaps() {
        let places = cluster(8);
        assert!(places.energy() > 0.0);
        assert_consistent(&places);
    }

    #[test]
    fn energy_matches_recomputation_while_adding() {
        let mut places = Places::new();
        for i in 0..10 {
            places.add(place(&format!("P{i}"), (i % 4) as f64 * 25.0, (i / 4) as f64 * 15.0));
            assert_consistent(&places);
        }
    }

    #[test]
    fn distant_places_are_not_neighbors_or_moveable() {
        let places: Places = [place("A", 0.0, 0.0), place("B", 1000.0, 1000.0)]
            .into_iter()
            .collect();
        assert!(places.neighbors(0).is_empty());
        assert!(places.neighbors(1).is_empty());
        assert!(!places.is_moveable(0));
        assert!(!places.is_moveable(1));
        let mut rng = StdRng::seed_from_u64(1);
        let mut copy = places.clone();
        assert_eq!(copy.move_label(&mut rng), Err(NothingToDo));
        assert_eq!(copy.get(0).map(Place::placement), places.get(0).map(Place::placement));
    }

    #[test]
    fn empty_places_have_nothing_to_do() {
        let mut places = Places::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(places.move_label(&mut rng), Err(NothingToDo));
        assert_eq!(places.energy(), 0.0);
    }

    #[test]
    fn isolated_place_never_moves() {
        let mut places: Places = [
            place("A", 0.0, 0.0),
            place("B", 10.0, 5.0),
            place("Far", 900.0, 900.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(places.moveable().len(), 2);
        let before = places.get(2).map(Place::placement);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..300 {
            places.move_label(&mut rng).expect("A and B can move");
        }
        assert_eq!(places.get(2).map(Place::placement), before);
    }

    #[test]
    fn history_chain_is_shared_by_clones() {
        let mut places = cluster(4);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..3 {
            places.remember();
            places.move_label(&mut rng).expect("moveable");
        }
        assert_eq!(places.history().count(), 4);
        let copy = places.clone();
        let (Some(a), Some(b)) = (places.previous(), copy.previous()) else {
            panic!("history missing");
        };
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn long_history_drops_without_recursion() {
        let mut places = cluster(2);
        for _ in 0..50_000 {
            places.remember();
        }
        assert_eq!(places.history().count(), 50_001);
        drop(places);
    }
}
