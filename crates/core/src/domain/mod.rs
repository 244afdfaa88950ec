pub mod registry;
pub mod series;
