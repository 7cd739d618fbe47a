pub mod canonical;
pub mod compiler;
pub mod contract;
pub mod generator;
pub mod phrases;
pub mod pipeline;
pub mod registry;
pub mod sequence;
