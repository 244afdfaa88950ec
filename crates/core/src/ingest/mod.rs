pub mod chain;
pub mod date;
pub mod extract;
pub mod provider;
pub mod twse;
pub mod types;
pub mod yahoo;
