/*!
Metropolis–Hastings sampling of periodic travel round trips.

A [`Scenario`](scenario::Scenario) fixes the locations, the travel times and
the discretization of one period into time bins. A
[`RoundTrip`](round_trip::RoundTrip) is a cyclic sequence of stays with one
departure bin each; the [`Simulator`](simulator::Simulator) expands it into
alternating stay and move episodes. Proposals in [`proposal`] and
[`multiple`] perturb round trips and populations of round trips, and the
chain in [`metropolis_hastings`] samples them proportionally to a product of
[`weights`].
*/

pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod metropolis_hastings;
pub mod multiple;
pub mod proposal;
pub mod round_trip;
pub mod scenario;
pub mod simulator;
pub mod stats;
pub mod transitions;
pub mod weights;
