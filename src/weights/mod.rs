/*!
Unnormalized log-densities over round trips and populations.

A [`SamplingWeight`] maps a state to a log weight in `ℝ ∪ {−∞}`. Weights are
combined additively in [`SamplingWeights`], each with a scalar coefficient.
A component may also veto a state outright through
[`SamplingWeight::accept`]; the engine never moves to a vetoed state.

Components take `&mut self` so that they can keep caches between calls
(see [`SingleToMultiWeight`]).

# Examples

```rust
use roundtrips::round_trip::RoundTrip;
use roundtrips::scenario::LocationId;
use roundtrips::weights::prior::MaximumEntropyPriorFactory;
use roundtrips::weights::{SamplingWeight, SamplingWeights};

let factory = MaximumEntropyPriorFactory::new(2, 24, 24);
let mut weights = SamplingWeights::new();
weights.add(factory.create_single(3.0).unwrap(), 1.0);

let rt = RoundTrip::new(vec![LocationId(0), LocationId(1)], vec![0, 12]).unwrap();
assert!(weights.log_weight(&rt).is_finite());
```
*/

pub mod periodic;
pub mod prior;
pub mod single_to_multi;
pub mod targets;
pub mod time_use;

pub use periodic::PeriodicScheduleWeight;
pub use prior::{ChiSquaredSizePrior, MaximumEntropyPriorFactory, SizePrior};
pub use single_to_multi::SingleToMultiWeight;
pub use targets::{
    AtHomeOverNightTarget, AtMainActivityTarget, HomeLocationTarget, OdTarget, PopulationTarget,
    TargetDeviationWeight,
};
pub use time_use::{AtHomeOverNight, LogarithmicTimeUse, TimeUseComponent};

/// A component of the unnormalized log-density of a state `S`.
pub trait SamplingWeight<S>: Send {
    /// Log weight of `state`; `f64::NEG_INFINITY` excludes the state.
    fn log_weight(&mut self, state: &S) -> f64;

    /// Hard constraint; a rejected state is never accepted.
    fn accept(&mut self, _state: &S) -> bool {
        true
    }

    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base).to_string()
    }
}

impl<S, W: SamplingWeight<S> + ?Sized> SamplingWeight<S> for Box<W> {
    fn log_weight(&mut self, state: &S) -> f64 {
        (**self).log_weight(state)
    }

    fn accept(&mut self, state: &S) -> bool {
        (**self).accept(state)
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

/**
Weighted sum of components: `Σ c_k · w_k(x)`.

A component returning `−∞` makes the whole sum `−∞` regardless of its
coefficient, and components with coefficient zero are skipped. All other
components are evaluated on every call. The order of components only affects
[`SamplingWeights::last_log_weights`].
*/
pub struct SamplingWeights<S> {
    components: Vec<(Box<dyn SamplingWeight<S>>, f64)>,
    last_log_weights: Vec<f64>,
}

impl<S> Default for SamplingWeights<S> {
    fn default() -> Self {
        Self {
            components: Vec::new(),
            last_log_weights: Vec::new(),
        }
    }
}

impl<S> SamplingWeights<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<W: SamplingWeight<S> + 'static>(
        &mut self,
        component: W,
        coefficient: f64,
    ) -> &mut Self {
        assert!(coefficient.is_finite(), "coefficient must be finite, got {coefficient}");
        self.components.push((Box::new(component), coefficient));
        self.last_log_weights.push(f64::NAN);
        self
    }

    pub fn with<W: SamplingWeight<S> + 'static>(mut self, component: W, coefficient: f64) -> Self {
        self.add(component, coefficient);
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Names and unscaled log weights from the latest evaluation, in insertion order.
    /// Components with coefficient zero report `NaN`.
    pub fn last_log_weights(&self) -> Vec<(String, f64)> {
        self.components
            .iter()
            .zip(&self.last_log_weights)
            .map(|((c, _), &lw)| (c.name(), lw))
            .collect()
    }
}

impl<S> SamplingWeight<S> for SamplingWeights<S> {
    fn log_weight(&mut self, state: &S) -> f64 {
        let mut sum = 0.0;
        for ((component, coefficient), last) in
            self.components.iter_mut().zip(self.last_log_weights.iter_mut())
        {
            if *coefficient == 0.0 {
                *last = f64::NAN;
                continue;
            }
            let lw = component.log_weight(state);
            *last = lw;
            sum += if lw == f64::NEG_INFINITY {
                f64::NEG_INFINITY
            } else {
                *coefficient * lw
            };
        }
        sum
    }

    fn accept(&mut self, state: &S) -> bool {
        self.components.iter_mut().all(|(c, _)| c.accept(state))
    }

    fn name(&self) -> String {
        "SamplingWeights".to_string()
    }
}
