/*!
Enumeration of the structural moves available from a round trip, with exact
selection probabilities.

Three move families exist:

- **insert** a new stay before index `i` (or after the last stay, index `n`),
  departing in a currently unused time bin;
- **remove** the stay at index `i` together with one uniformly chosen departure;
- **flip** the location of the stay at index `i`.

A family is selected uniformly among the families that have at least one legal
instance; the index and value are then drawn uniformly among the legal
candidates. [`PossibleTransitions::move_proba`] returns the exact probability
of drawing a given concrete move, which lets proposals compute the backward
probability by building the generator on the candidate and asking for the
reverse move.
*/

use rand::Rng;

use crate::error::SamplerError;
use crate::round_trip::RoundTrip;
use crate::scenario::{LocationId, Scenario};

/// A concrete move on a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Insert {
        index: usize,
        location: LocationId,
        departure: usize,
    },
    Remove {
        index: usize,
        departure_index: usize,
    },
    Flip {
        index: usize,
        location: LocationId,
    },
}

impl Move {
    /// Returns a copy of `from` with this move applied. Episodes are not simulated.
    pub fn apply(&self, from: &RoundTrip) -> RoundTrip {
        let mut candidate = from.clone();
        match *self {
            Move::Insert {
                index,
                location,
                departure,
            } => candidate.insert(index, location, departure),
            Move::Remove {
                index,
                departure_index,
            } => candidate.remove(index, departure_index),
            Move::Flip { index, location } => candidate.set_location(index, location),
        }
        candidate
    }

    /// The move that undoes this one, expressed on the state `self.apply(from)`.
    pub fn reverse(&self, from: &RoundTrip) -> Move {
        match *self {
            Move::Insert {
                index, departure, ..
            } => Move::Remove {
                index,
                departure_index: from.departures().partition_point(|&d| d < departure),
            },
            Move::Remove {
                index,
                departure_index,
            } => Move::Insert {
                index,
                location: from.location(index),
                departure: from.departure(departure_index),
            },
            Move::Flip { index, .. } => Move::Flip {
                index,
                location: from.location(index),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Insert,
    Remove,
    Flip,
}

/// Legal moves of one round trip and their selection probabilities.
#[derive(Debug, Clone)]
pub struct PossibleTransitions {
    size: usize,
    time_bin_cnt: usize,
    insert_locations: Vec<Vec<LocationId>>,
    insert_indices: Vec<usize>,
    remove_indices: Vec<usize>,
    flip_locations: Vec<Vec<LocationId>>,
    flip_indices: Vec<usize>,
    families: Vec<Family>,
}

impl PossibleTransitions {
    pub fn new(state: &RoundTrip, scenario: &Scenario) -> Self {
        let n = state.size();
        let candidates = |excluded: &[LocationId]| -> Vec<LocationId> {
            scenario
                .location_ids()
                .filter(|loc| !excluded.contains(loc))
                .collect()
        };

        let insert_locations: Vec<Vec<LocationId>> = if n < scenario.max_stay_episodes() {
            (0..=n)
                .map(|i| {
                    if i < n {
                        candidates(&[state.predecessor_location(i), state.location(i)])
                    } else {
                        candidates(&[state.location(n - 1), state.location(0)])
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        let remove_indices: Vec<usize> = if n > 1 {
            (0..n)
                .filter(|&i| n <= 3 || state.predecessor_location(i) != state.successor_location(i))
                .collect()
        } else {
            Vec::new()
        };

        let flip_locations: Vec<Vec<LocationId>> = (0..n)
            .map(|i| {
                if n > 1 {
                    candidates(&[
                        state.location(i),
                        state.predecessor_location(i),
                        state.successor_location(i),
                    ])
                } else {
                    candidates(&[state.location(i)])
                }
            })
            .collect();

        let non_empty = |lists: &[Vec<LocationId>]| -> Vec<usize> {
            lists
                .iter()
                .enumerate()
                .filter(|(_, locs)| !locs.is_empty())
                .map(|(i, _)| i)
                .collect()
        };
        let insert_indices = non_empty(&insert_locations);
        let flip_indices = non_empty(&flip_locations);

        let mut families = Vec::with_capacity(3);
        if !insert_indices.is_empty() {
            families.push(Family::Insert);
        }
        if !remove_indices.is_empty() {
            families.push(Family::Remove);
        }
        if !flip_indices.is_empty() {
            families.push(Family::Flip);
        }

        Self {
            size: n,
            time_bin_cnt: scenario.time_bin_cnt(),
            insert_locations,
            insert_indices,
            remove_indices,
            flip_locations,
            flip_indices,
            families,
        }
    }

    fn family_proba(&self, family: Family) -> f64 {
        if self.families.contains(&family) {
            1.0 / self.families.len() as f64
        } else {
            0.0
        }
    }

    pub fn insert_proba(&self) -> f64 {
        self.family_proba(Family::Insert)
    }

    pub fn remove_proba(&self) -> f64 {
        self.family_proba(Family::Remove)
    }

    pub fn flip_proba(&self) -> f64 {
        self.family_proba(Family::Flip)
    }

    /// Indices at which at least one location can be inserted.
    pub fn insert_indices(&self) -> &[usize] {
        &self.insert_indices
    }

    pub fn remove_indices(&self) -> &[usize] {
        &self.remove_indices
    }

    pub fn flip_indices(&self) -> &[usize] {
        &self.flip_indices
    }

    /// Locations insertable before `index`; empty if the round trip is full.
    pub fn insert_locations(&self, index: usize) -> &[LocationId] {
        self.insert_locations
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn flip_locations(&self, index: usize) -> &[LocationId] {
        self.flip_locations
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of unused departure bins.
    pub fn free_departure_cnt(&self) -> usize {
        self.time_bin_cnt - self.size
    }

    /// Probability of drawing any particular insert at `index`.
    pub fn concrete_insert_proba(&self, index: usize) -> f64 {
        let locs = self.insert_locations(index).len();
        if locs == 0 {
            return 0.0;
        }
        self.insert_proba()
            / self.insert_indices.len() as f64
            / locs as f64
            / self.free_departure_cnt() as f64
    }

    /// Probability of drawing any particular remove at a legal index.
    pub fn concrete_remove_proba(&self) -> f64 {
        if self.remove_indices.is_empty() {
            return 0.0;
        }
        self.remove_proba() / self.remove_indices.len() as f64 / self.size as f64
    }

    /// Probability of drawing any particular flip at `index`.
    pub fn concrete_flip_proba(&self, index: usize) -> f64 {
        let locs = self.flip_locations(index).len();
        if locs == 0 {
            return 0.0;
        }
        self.flip_proba() / self.flip_indices.len() as f64 / locs as f64
    }

    /// Exact probability of drawing `mv` from `state`; zero if `mv` is illegal.
    pub fn move_proba(&self, state: &RoundTrip, mv: &Move) -> f64 {
        debug_assert_eq!(state.size(), self.size);
        match *mv {
            Move::Insert {
                index,
                location,
                departure,
            } => {
                if departure >= self.time_bin_cnt
                    || state.contains_departure(departure)
                    || !self.insert_locations(index).contains(&location)
                {
                    0.0
                } else {
                    self.concrete_insert_proba(index)
                }
            }
            Move::Remove {
                index,
                departure_index,
            } => {
                if departure_index < self.size && self.remove_indices.contains(&index) {
                    self.concrete_remove_proba()
                } else {
                    0.0
                }
            }
            Move::Flip { index, location } => {
                if self.flip_locations(index).contains(&location) {
                    self.concrete_flip_proba(index)
                } else {
                    0.0
                }
            }
        }
    }

    /// Draws a move from `state`.
    ///
    /// # Errors
    ///
    /// [`SamplerError::NoLegalTransition`] if no family has a legal instance.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        state: &RoundTrip,
        rng: &mut R,
    ) -> Result<Move, SamplerError> {
        if self.families.is_empty() {
            return Err(SamplerError::NoLegalTransition { size: self.size });
        }
        let mv = match self.families[rng.gen_range(0..self.families.len())] {
            Family::Insert => {
                let index = self.insert_indices[rng.gen_range(0..self.insert_indices.len())];
                let locs = &self.insert_locations[index];
                let location = locs[rng.gen_range(0..locs.len())];
                let nth = rng.gen_range(0..self.free_departure_cnt());
                let departure = nth_free_departure(state, nth);
                Move::Insert {
                    index,
                    location,
                    departure,
                }
            }
            Family::Remove => Move::Remove {
                index: self.remove_indices[rng.gen_range(0..self.remove_indices.len())],
                departure_index: rng.gen_range(0..self.size),
            },
            Family::Flip => {
                let index = self.flip_indices[rng.gen_range(0..self.flip_indices.len())];
                let locs = &self.flip_locations[index];
                Move::Flip {
                    index,
                    location: locs[rng.gen_range(0..locs.len())],
                }
            }
        };
        Ok(mv)
    }

    /// All legal concrete moves from `state`.
    pub fn enumerate_moves(&self, state: &RoundTrip) -> Vec<Move> {
        let mut moves = Vec::new();
        let free: Vec<usize> = (0..self.time_bin_cnt)
            .filter(|&bin| !state.contains_departure(bin))
            .collect();
        for &index in &self.insert_indices {
            for &location in &self.insert_locations[index] {
                moves.extend(free.iter().map(|&departure| Move::Insert {
                    index,
                    location,
                    departure,
                }));
            }
        }
        for &index in &self.remove_indices {
            moves.extend((0..self.size).map(|departure_index| Move::Remove {
                index,
                departure_index,
            }));
        }
        for &index in &self.flip_indices {
            moves.extend(
                self.flip_locations[index]
                    .iter()
                    .map(|&location| Move::Flip { index, location }),
            );
        }
        moves
    }
}

/// The `k`-th (zero based) departure bin not used by `state`.
pub fn nth_free_departure(state: &RoundTrip, k: usize) -> usize {
    let mut bin = k;
    for &used in state.departures() {
        if used <= bin {
            bin += 1;
        } else {
            break;
        }
    }
    bin
}
