pub mod config;
pub mod engine;
pub mod gate;
pub mod graph;
pub mod motif;
pub mod present;
pub mod rng;
pub mod routing;
pub mod session;
