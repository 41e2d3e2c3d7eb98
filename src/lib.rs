pub mod advisor;
pub mod advisory;
pub mod constants;
pub mod engine;
pub mod grid;
pub mod level;
pub mod pathfinder;
pub mod rng;
pub mod schedule;
pub mod server_protocol;
pub mod server_utils;
pub mod targeting;
pub mod types;
