use std::{cmp::Ordering, collections::HashMap};

use serde::{Deserialize, Serialize};

use crate::{db::models::VisitRecord, stats::aggregate_visits};

use super::types::{GeoPoint, PlaceCandidate, RankedPlace};

/// Order candidates nearest first. Candidates without a usable distance go last,
/// keeping their relative order.
pub fn rank_by_distance(origin: &GeoPoint, candidates: Vec<PlaceCandidate>) -> Vec<RankedPlace> {
    let mut ranked: Vec<RankedPlace> = candidates
        .into_iter()
        .map(|place| {
            let distance_meters = place
                .distance_meters
                .or_else(|| place.position.map(|position| origin.distance_to(&position)))
                .filter(|distance| distance.is_finite());
            RankedPlace {
                place,
                distance_meters,
            }
        })
        .collect();

    ranked.sort_by(|a, b| match (a.distance_meters, b.distance_meters) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranked
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearbyEstablishment {
    pub establishment_name: String,
    pub formatted_address: Option<String>,
    pub distance_meters: f64,
    pub average_rating: f64,
    pub average_wait_secs: f64,
    pub visit_count: usize,
}

/// Logged establishments within `radius_meters` of `origin`, nearest first, with
/// their average rating and wait. Visits without coordinates are ignored.
pub fn nearby_establishments(
    origin: &GeoPoint,
    visits: &[VisitRecord],
    radius_meters: f64,
) -> Vec<NearbyEstablishment> {
    let located: Vec<&VisitRecord> = visits
        .iter()
        .filter(|visit| visit.coordinates().is_some())
        .collect();

    // Keyed by place id when known so two branches with the same name stay apart.
    // A visit without a place id joins the place of the same name, unless that
    // name belongs to more than one place.
    let mut place_by_name: HashMap<&str, Option<&str>> = HashMap::new();
    for visit in &located {
        if let Some(place_id) = visit.details.place_id.as_deref() {
            place_by_name
                .entry(visit.establishment_name())
                .and_modify(|known| {
                    if *known != Some(place_id) {
                        *known = None;
                    }
                })
                .or_insert(Some(place_id));
        }
    }

    let mut groups: HashMap<String, Vec<&VisitRecord>> = HashMap::new();
    let mut keys_in_order = Vec::new();
    for visit in located {
        let key = visit
            .details
            .place_id
            .as_deref()
            .or_else(|| place_by_name.get(visit.establishment_name()).copied().flatten())
            .unwrap_or(visit.establishment_name())
            .to_string();
        let group = groups.entry(key.clone()).or_default();
        if group.is_empty() {
            keys_in_order.push(key);
        }
        group.push(visit);
    }

    let candidates = keys_in_order
        .iter()
        .filter_map(|key| {
            let latest = groups.get(key)?.iter().max_by_key(|visit| visit.created_at)?;
            let (latitude, longitude) = latest.coordinates()?;
            let mut candidate = PlaceCandidate::new(
                latest.establishment_name(),
                Some(GeoPoint::new(latitude, longitude)),
            );
            candidate.place_id = Some(key.clone());
            candidate.formatted_address = latest.details.formatted_address.clone();
            Some(candidate)
        })
        .collect();

    rank_by_distance(origin, candidates)
        .into_iter()
        .filter_map(|ranked| {
            let distance_meters = ranked.distance_meters.filter(|d| *d <= radius_meters)?;
            let key = ranked.place.place_id.as_deref()?;
            let stats = aggregate_visits(groups.get(key)?.iter().copied());
            Some(NearbyEstablishment {
                establishment_name: ranked.place.name,
                formatted_address: ranked.place.formatted_address,
                distance_meters,
                average_rating: stats.average_rating,
                average_wait_secs: stats.average_wait_secs,
                visit_count: stats.visit_count,
            })
        })
        .collect()
}
