//! Settlement engine for discrete-outcome prediction markets

pub mod clock;
pub mod config;
pub mod engine;
pub mod math;
pub mod state;
pub mod types;

pub use engine::Engine;
