use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::models::VisitRecord;

use super::aggregator::{aggregate_visits, AggregateStats};

/// The search screen shows at most this many establishments.
pub const SEARCH_RESULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EstablishmentStats {
    pub establishment_name: String,
    /// Address from the most recent visit that had one.
    pub formatted_address: Option<String>,
    #[serde(flatten)]
    pub stats: AggregateStats,
}

/// Split a name-search result into one summary per establishment, ordered by name.
pub fn summarize_establishments(visits: &[VisitRecord]) -> Vec<EstablishmentStats> {
    let mut by_name: BTreeMap<&str, Vec<&VisitRecord>> = BTreeMap::new();
    for visit in visits {
        by_name
            .entry(visit.establishment_name())
            .or_default()
            .push(visit);
    }

    by_name
        .into_iter()
        .take(SEARCH_RESULT_LIMIT)
        .map(|(name, group)| {
            let formatted_address = group
                .iter()
                .filter_map(|visit| {
                    visit
                        .details
                        .formatted_address
                        .as_deref()
                        .filter(|address| !address.is_empty())
                        .map(|address| (visit.created_at, address))
                })
                .max()
                .map(|(_, address)| address.to_string());

            EstablishmentStats {
                establishment_name: name.to_string(),
                formatted_address,
                stats: aggregate_visits(group),
            }
        })
        .collect()
}
