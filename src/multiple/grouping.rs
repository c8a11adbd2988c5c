/*!
Deterministic partition of population slots into weighted groups.

Group `g` with weight `w_g` is owed `w_g / Σ w · N` slots. Slots are handed
out in index order, each to the group that is currently owed the most (ties go
to the group added first), which keeps every group within one slot of its
share.
*/

use crate::multiple::MultiRoundTrip;
use crate::round_trip::RoundTrip;

#[derive(Debug, Clone, PartialEq)]
pub struct PopulationGrouping {
    population_size: usize,
    groups: Vec<(String, f64)>,
    indices: Vec<Vec<usize>>,
}

impl PopulationGrouping {
    pub fn new(population_size: usize) -> Self {
        Self {
            population_size,
            groups: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Adds a group and reassigns all slots.
    pub fn add_group(&mut self, name: impl Into<String>, weight: f64) -> &mut Self {
        assert!(weight >= 0.0 && weight.is_finite(), "invalid group weight {weight}");
        self.groups.push((name.into(), weight));
        self.assign();
        self
    }

    fn assign(&mut self) {
        let weight_sum: f64 = self.groups.iter().map(|(_, w)| w).sum();
        let mut slack: Vec<f64> = self
            .groups
            .iter()
            .map(|(_, w)| w / weight_sum * self.population_size as f64)
            .collect();
        self.indices = vec![Vec::new(); self.groups.len()];
        for i in 0..self.population_size {
            let mut best = 0;
            for g in 1..slack.len() {
                if slack[g] > slack[best] {
                    best = g;
                }
            }
            self.indices[best].push(i);
            slack[best] -= 1.0;
        }
    }

    pub fn population_size(&self) -> usize {
        self.population_size
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(name, _)| name.as_str())
    }

    /// Slot indices of `group`; empty for an unknown group.
    pub fn indices(&self, group: &str) -> &[usize] {
        self.groups
            .iter()
            .position(|(name, _)| name == group)
            .map(|g| self.indices[g].as_slice())
            .unwrap_or(&[])
    }

    pub fn create_filter(&self, group: &str) -> PopulationGroupFilter {
        PopulationGroupFilter::new(group, self.indices(group).to_vec())
    }
}

/// Selects the round trips of one population group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationGroupFilter {
    group_name: String,
    indices: Vec<usize>,
}

impl PopulationGroupFilter {
    pub fn new(group_name: impl Into<String>, indices: Vec<usize>) -> Self {
        Self {
            group_name: group_name.into(),
            indices,
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn group_size(&self) -> usize {
        self.indices.len()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn iter<'a>(
        &'a self,
        population: &'a MultiRoundTrip,
    ) -> impl Iterator<Item = &'a RoundTrip> + 'a {
        self.indices.iter().map(move |&i| population.round_trip(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::LocationId;

    #[test]
    fn test_assignment_follows_weights() {
        let mut grouping = PopulationGrouping::new(14);
        grouping.add_group("a", 1.0).add_group("b", 2.0).add_group("c", 4.0);

        assert_eq!(grouping.indices("a").len(), 2);
        assert_eq!(grouping.indices("b").len(), 4);
        assert_eq!(grouping.indices("c").len(), 8);

        let mut all: Vec<usize> = grouping
            .group_names()
            .flat_map(|g| grouping.indices(g).to_vec())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..14).collect::<Vec<_>>());
    }

    #[test]
    fn test_ties_go_to_first_group() {
        let mut grouping = PopulationGrouping::new(3);
        grouping.add_group("x", 1.0).add_group("y", 1.0);
        assert_eq!(grouping.indices("x"), &[0, 2]);
        assert_eq!(grouping.indices("y"), &[1]);
        assert!(grouping.indices("z").is_empty());
    }

    #[test]
    fn test_filter_iterates_group_members() {
        let mut grouping = PopulationGrouping::new(3);
        grouping.add_group("x", 1.0).add_group("y", 1.0);
        let population = MultiRoundTrip::new(
            (0..3)
                .map(|i| RoundTrip::new(vec![LocationId(i)], vec![0]).unwrap())
                .collect(),
        )
        .unwrap();
        let filter = grouping.create_filter("x");
        assert_eq!(filter.group_name(), "x");
        assert_eq!(filter.group_size(), 2);
        let homes: Vec<LocationId> = filter.iter(&population).map(RoundTrip::home).collect();
        assert_eq!(homes, vec![LocationId(0), LocationId(2)]);
    }
}
