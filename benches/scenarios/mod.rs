//! Scenario benchmarks: whole voices and the engine under load.

mod engine;
mod voices;

pub use engine::bench_engine;
pub use voices::bench_voices;
