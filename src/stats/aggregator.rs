use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::db::models::{OrderType, VisitRecord};

/// Summary over a set of visits. Averages are not rounded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub average_wait_secs: f64,
    pub average_rating: f64,
    pub visit_count: usize,
    pub drinks: Vec<DrinkStats>,
}

/// Wait statistics for one `(order type, drink details)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DrinkStats {
    pub order_type: OrderType,
    pub drink_details: String,
    pub count: usize,
    pub average_wait_secs: f64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum: u64,
    count: usize,
}

impl Accumulator {
    fn add(&mut self, value: u64) {
        self.sum = self.sum.saturating_add(value);
        self.count += 1;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// Compute averages for a set of visits, typically all visits to one establishment.
///
/// Drink groups are keyed by order type and the exact drink details text, and are
/// emitted sorted by that key, so the result does not depend on input order.
pub fn aggregate_visits<'a, I>(visits: I) -> AggregateStats
where
    I: IntoIterator<Item = &'a VisitRecord>,
{
    let mut waits = Accumulator::default();
    let mut ratings = Accumulator::default();
    let mut drinks: BTreeMap<(OrderType, &str), Accumulator> = BTreeMap::new();

    for visit in visits {
        waits.add(visit.wait_time_secs);
        ratings.add(u64::from(visit.rating.value()));
        drinks
            .entry((visit.order_type(), visit.drink_details()))
            .or_default()
            .add(visit.wait_time_secs);
    }

    AggregateStats {
        average_wait_secs: waits.mean(),
        average_rating: ratings.mean(),
        visit_count: waits.count,
        drinks: drinks
            .into_iter()
            .map(|((order_type, drink_details), acc)| DrinkStats {
                order_type,
                drink_details: drink_details.to_string(),
                count: acc.count,
                average_wait_secs: acc.mean(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::db::models::{Rating, VisitDetails};

    fn visit(order_type: OrderType, drink: &str, wait: u64, rating: i64) -> VisitRecord {
        VisitRecord {
            id: format!("{drink}-{wait}"),
            details: VisitDetails::new("The Crown", order_type, drink),
            wait_time_secs: wait,
            rating: Rating::new(rating).unwrap(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap(),
        }
    }

    #[test]
    fn empty_input_is_all_zero() {
        let stats = aggregate_visits(&[]);
        assert_eq!(stats.average_wait_secs, 0.0);
        assert_eq!(stats.average_rating, 0.0);
        assert_eq!(stats.visit_count, 0);
        assert!(stats.drinks.is_empty());
        assert!(!stats.average_wait_secs.is_nan());
    }

    #[test]
    fn groups_by_order_type_and_details() {
        let visits = vec![
            visit(OrderType::Beer, "Lager", 60, 4),
            visit(OrderType::Beer, "Lager", 120, 2),
            visit(OrderType::Wine, "Red", 30, 3),
        ];
        let stats = aggregate_visits(&visits);

        assert_eq!(stats.average_wait_secs, 70.0);
        assert_eq!(stats.average_rating, 3.0);
        assert_eq!(stats.visit_count, 3);
        assert_eq!(
            stats.drinks,
            vec![
                DrinkStats {
                    order_type: OrderType::Beer,
                    drink_details: "Lager".into(),
                    count: 2,
                    average_wait_secs: 90.0,
                },
                DrinkStats {
                    order_type: OrderType::Wine,
                    drink_details: "Red".into(),
                    count: 1,
                    average_wait_secs: 30.0,
                },
            ]
        );
    }

    #[test]
    fn same_order_type_different_details_are_distinct() {
        let visits = vec![
            visit(OrderType::Beer, "Lager", 60, 4),
            visit(OrderType::Beer, "IPA", 90, 4),
        ];
        let stats = aggregate_visits(&visits);
        assert_eq!(stats.drinks.len(), 2);
        assert!(stats.drinks.iter().all(|d| d.count == 1));
    }

    #[test]
    fn permutation_does_not_change_result() {
        let visits = vec![
            visit(OrderType::Cocktail, "Negroni", 240, 5),
            visit(OrderType::Beer, "Lager", 60, 4),
            visit(OrderType::Wine, "Red", 30, 1),
            visit(OrderType::Beer, "Lager", 120, 2),
        ];
        let forward = aggregate_visits(&visits);
        let reversed = aggregate_visits(visits.iter().rev());
        let rotated = aggregate_visits(visits[2..].iter().chain(&visits[..2]));
        assert_eq!(forward, reversed);
        assert_eq!(forward, rotated);
    }

    #[test]
    fn averages_are_not_rounded() {
        let visits = vec![
            visit(OrderType::Spirit, "Gin", 31, 4),
            visit(OrderType::Spirit, "Gin", 32, 5),
        ];
        let stats = aggregate_visits(&visits);
        assert_eq!(stats.average_wait_secs, 31.5);
        assert_eq!(stats.average_rating, 4.5);
    }
}
