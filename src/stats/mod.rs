pub mod aggregator;
pub mod commands;
pub mod establishments;

pub use aggregator::{aggregate_visits, AggregateStats, DrinkStats};
pub use establishments::{summarize_establishments, EstablishmentStats, SEARCH_RESULT_LIMIT};
