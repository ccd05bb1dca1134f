pub mod cochange;
pub mod dependency;
pub mod metrics;
pub mod score;
pub mod statistics;
