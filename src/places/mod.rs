mod geolocation;
mod ranker;
mod types;

pub use geolocation::{FixedPosition, GeolocationError, GeolocationProvider};
pub use ranker::{nearby_establishments, rank_by_distance, NearbyEstablishment};
pub use types::{GeoPoint, PlaceCandidate, RankedPlace};
