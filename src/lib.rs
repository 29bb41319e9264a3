pub mod config;
pub mod consolidate;
pub mod importers;
pub mod normalize;
pub mod orchestrator;
pub mod output;
pub mod specs;
pub mod sync;
