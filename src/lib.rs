pub mod analyzers;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod roster;
pub mod schema;
pub mod sheet;
