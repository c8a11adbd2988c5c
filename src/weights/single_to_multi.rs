use crate::multiple::MultiRoundTrip;
use crate::round_trip::RoundTrip;
use crate::weights::SamplingWeight;

/**
Lifts a single-round-trip weight to a population by summing it over all slots.

The log weight of every slot is cached together with the round trip it was
computed for; only slots whose round trip changed since the previous call are
re-evaluated.
*/
#[derive(Debug, Clone)]
pub struct SingleToMultiWeight<W> {
    single: W,
    cache: Vec<Option<(RoundTrip, f64)>>,
}

impl<W: SamplingWeight<RoundTrip>> SingleToMultiWeight<W> {
    pub fn new(single: W) -> Self {
        Self {
            single,
            cache: Vec::new(),
        }
    }

    pub fn single(&self) -> &W {
        &self.single
    }
}

impl<W: SamplingWeight<RoundTrip>> SamplingWeight<MultiRoundTrip> for SingleToMultiWeight<W> {
    fn log_weight(&mut self, state: &MultiRoundTrip) -> f64 {
        if self.cache.len() != state.size() {
            self.cache = vec![None; state.size()];
        }
        let mut sum = 0.0;
        for (rt, cached) in state.iter().zip(self.cache.iter_mut()) {
            let lw = match cached {
                Some((previous, lw)) if previous == rt => *lw,
                _ => {
                    let lw = self.single.log_weight(rt);
                    *cached = Some((rt.clone(), lw));
                    lw
                }
            };
            sum += lw;
        }
        sum
    }

    fn accept(&mut self, state: &MultiRoundTrip) -> bool {
        state.iter().all(|rt| self.single.accept(rt))
    }

    fn name(&self) -> String {
        format!("SingleToMulti({})", self.single.name())
    }
}
