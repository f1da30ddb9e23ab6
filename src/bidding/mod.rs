pub mod admission;
pub mod commands;
pub mod model;
pub mod pricing;
