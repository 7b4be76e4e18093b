// Race runtime for a four-wheel omnidirectional vehicle.
//
// The vehicle follows a fixed course made of distance-gated straights and
// timed turns. Each control tick the `safety` monitor samples the operator
// stop button, then the `sequencer` checks the active segment's exit
// condition and re-commands the `motor` controller on transitions.

pub mod config;
pub mod course;
pub mod distance;
pub mod hal;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod safety;
pub mod sequencer;
pub mod sim;
pub mod telemetry;
