use std::error::Error;
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use roundtrips::config::SamplerConfig;
use roundtrips::core::{ChainRunner, MarkovChain};
use roundtrips::io::{LocationCountLogger, SampleCollector, SizeDistributionLogger, TargetLogger};
use roundtrips::metropolis_hastings::{MHAlgorithm, MetropolisHastings};
use roundtrips::multiple::{MultiRoundTrip, MultiRoundTripProposal, OdFlows, SlotSelection};
use roundtrips::proposal::{DepartureProposal, MHProposal, MixtureProposal, RoundTripProposal};
use roundtrips::round_trip::RoundTrip;
use roundtrips::scenario::{Location, Scenario, ScenarioBuilder};
use roundtrips::simulator::{DefaultSimulator, Simulator};
use roundtrips::weights::{
    AtHomeOverNight, MaximumEntropyPriorFactory, OdTarget, PeriodicScheduleWeight, SamplingWeights,
    TargetDeviationWeight,
};

fn scenario() -> Result<Scenario, Box<dyn Error>> {
    let mut builder = ScenarioBuilder::new(1.0, 24)?;
    let home = builder.add_location(Location::new("home"))?;
    let work = builder.add_location(Location::new("work").with_charging(true))?;
    let shop = builder.add_location(Location::new("shop"))?;
    builder
        .set_symmetric_time_h(home, work, 0.5)?
        .set_symmetric_time_h(home, shop, 0.25)?
        .set_symmetric_time_h(work, shop, 0.5)?
        .set_symmetric_distance_km(home, work, 20.0)?
        .set_symmetric_distance_km(home, shop, 5.0)?
        .set_symmetric_distance_km(work, shop, 18.0)?;
    builder.max_stay_episodes(6)?;
    Ok(builder.build()?)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => SamplerConfig::from_file(path)?,
        None => SamplerConfig {
            n_chains: 4,
            ..SamplerConfig::default()
        },
    };
    let seed = config.seed.unwrap_or(42);
    let scenario = Arc::new(scenario()?);
    let simulator: Arc<dyn Simulator> = Arc::new(DefaultSimulator::new(scenario.clone()));
    let home = scenario.location_id("home").ok_or("no home location")?;
    let prior = MaximumEntropyPriorFactory::from_scenario(&scenario);

    // Independent single-traveler chains.
    let mut sizes = Vec::new();
    let mut mh = MetropolisHastings::from_fn(config.n_chains, |i| {
        let mut weights = SamplingWeights::new();
        weights
            .add(prior.create_single(3.0)?, 1.0)
            .add(PeriodicScheduleWeight::new(8.0, scenario.period_length_h()), 1.0)
            .add(AtHomeOverNight::new(6.0, 8.0, 6.0, scenario.period_length_h(), 1.0), 1.0);
        let structure: Box<dyn MHProposal<RoundTrip>> =
            Box::new(RoundTripProposal::new(scenario.clone(), simulator.clone()));
        let timing: Box<dyn MHProposal<RoundTrip>> =
            Box::new(DepartureProposal::new(scenario.clone(), simulator.clone()));
        let proposal = MixtureProposal::new(vec![(structure, 0.8), (timing, 0.2)])?;

        let initial = simulator.attach(scenario.create_initial_round_trip(home, 0)?);
        let collector = SampleCollector::new(config.schedule(), |rt: &RoundTrip| rt.size());
        sizes.push(collector.handle());
        Ok(MHAlgorithm::new(proposal, weights, initial)?
            .with_msg_interval(config.msg_interval)
            .with_features(1, |rt: &RoundTrip| vec![rt.size() as f64])
            .with_state_processor(collector)
            .with_state_processor(LocationCountLogger::new(
                config.output_dir.join(format!("chain{i}_locations.tsv")),
                config.schedule(),
                &scenario,
            )))
    })?
    .set_seed(seed);

    let final_states = mh.run_with_progress(config.iterations)?;
    for (i, (state, samples)) in final_states.iter().zip(&sizes).enumerate() {
        let samples = samples.lock().map_err(|_| "poisoned sample store")?;
        let mean = samples.iter().sum::<usize>() as f64 / samples.len().max(1) as f64;
        println!(
            "Chain {i}: final round trip {state}, mean size {mean:.3} over {} samples",
            samples.len()
        );
    }
    if config.n_chains > 1 {
        println!("R-hat of round-trip size: {:.4}", mh.rhat()?[0]);
    }

    // One population chain pulled towards an OD matrix.
    let work = scenario.location_id("work").ok_or("no work location")?;
    let shop = scenario.location_id("shop").ok_or("no shop location")?;
    let population_size = 50;
    let mut od = OdTarget::new(&scenario);
    od.set_od_entry(home, work, 30.0)?
        .set_od_entry(work, home, 30.0)?
        .set_od_entry(home, shop, 10.0)?
        .set_od_entry(shop, home, 10.0)?;

    let mut weights = SamplingWeights::new();
    weights
        .add(prior.create_multiple(population_size)?, 1.0)
        .add(TargetDeviationWeight::new(od.clone())?, 10.0);
    let mut rng = SmallRng::seed_from_u64(seed);
    let initial = MultiRoundTrip::create_initial(
        &scenario,
        simulator.as_ref(),
        &[home],
        &[0, 6, 12, 18],
        population_size,
        &mut rng,
    )?
    .with_summary(OdFlows::new(scenario.location_cnt()));
    let proposal = MultiRoundTripProposal::new(
        RoundTripProposal::new(scenario.clone(), simulator.clone()),
        SlotSelection::Single,
    );
    let mut chain = MHAlgorithm::new(proposal, weights, initial)?
        .set_seed(seed)
        .with_msg_interval(config.msg_interval)
        .with_state_processor(SizeDistributionLogger::new(
            config.output_dir.join("population_sizes.tsv"),
            config.schedule(),
            scenario.max_stay_episodes(),
            true,
        ))
        .with_state_processor(TargetLogger::new(
            config.output_dir.join("population_od.tsv"),
            config.schedule(),
            od,
            None,
        ));
    chain.run(config.iterations)?;
    println!(
        "Population: {} stays, acceptance rate {:.3}",
        chain.current_state().stay_cnt(),
        chain.acceptance_rate()
    );
    Ok(())
}
