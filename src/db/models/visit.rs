//! Visit-related data models.
//!
//! - `VisitRecord`: one completed wait-time measurement with its rating.
//! - `VisitDetails`: establishment and order metadata captured before timing starts.
//! - `OrderType`, `Rating`: validated value types shared by the session and the store.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejections raised when a visit (or its parts) fails ingestion checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisitError {
    #[error("establishment name must not be empty")]
    EmptyEstablishment,
    #[error("drink details must not be empty")]
    EmptyDrinkDetails,
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),
    #[error("latitude and longitude must be given together")]
    PartialCoordinates,
    #[error("unknown order type '{0}'")]
    UnknownOrderType(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Beer,
    Bottles,
    Cocktail,
    Wine,
    Spirit,
    Other,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Beer => "beer",
            OrderType::Bottles => "bottles",
            OrderType::Cocktail => "cocktail",
            OrderType::Wine => "wine",
            OrderType::Spirit => "spirit",
            OrderType::Other => "other",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = VisitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            // Older entries were logged as "pint".
            "beer" | "pint" => Ok(OrderType::Beer),
            "bottles" => Ok(OrderType::Bottles),
            "cocktail" => Ok(OrderType::Cocktail),
            "wine" => Ok(OrderType::Wine),
            "spirit" => Ok(OrderType::Spirit),
            "other" => Ok(OrderType::Other),
            _ => Err(VisitError::UnknownOrderType(value.to_string())),
        }
    }
}

/// Service rating, always within `1..=5`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, VisitError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(VisitError::RatingOutOfRange(value))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = VisitError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// Where and what was ordered. Supplied when a timing session starts and copied
/// into the resulting `VisitRecord`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitDetails {
    pub establishment_name: String,
    pub location: String,
    pub formatted_address: Option<String>,
    pub place_id: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub order_type: OrderType,
    pub drink_details: String,
}

impl VisitDetails {
    /// Details for a place picked by name only; `location` mirrors the name.
    pub fn new(
        establishment_name: impl Into<String>,
        order_type: OrderType,
        drink_details: impl Into<String>,
    ) -> Self {
        let establishment_name = establishment_name.into();
        Self {
            location: establishment_name.clone(),
            establishment_name,
            formatted_address: None,
            place_id: None,
            latitude: None,
            longitude: None,
            order_type,
            drink_details: drink_details.into(),
        }
    }

    pub fn with_place(
        mut self,
        place_id: impl Into<String>,
        formatted_address: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        self.place_id = Some(place_id.into());
        self.formatted_address = Some(formatted_address.into());
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn validate(&self) -> Result<(), VisitError> {
        if self.establishment_name.trim().is_empty() {
            return Err(VisitError::EmptyEstablishment);
        }
        if self.drink_details.trim().is_empty() {
            return Err(VisitError::EmptyDrinkDetails);
        }
        if self.latitude.is_some() != self.longitude.is_some() {
            return Err(VisitError::PartialCoordinates);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub id: String,
    #[serde(flatten)]
    pub details: VisitDetails,
    pub wait_time_secs: u64,
    pub rating: Rating,
    pub created_at: DateTime<Utc>,
}

impl VisitRecord {
    pub fn establishment_name(&self) -> &str {
        &self.details.establishment_name
    }

    pub fn order_type(&self) -> OrderType {
        self.details.order_type
    }

    pub fn drink_details(&self) -> &str {
        &self.details.drink_details
    }

    /// Both coordinates, when the visit was tied to a mapped place.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.details.latitude.zip(self.details.longitude)
    }

    pub fn validate(&self) -> Result<(), VisitError> {
        self.details.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(1).unwrap().value(), 1);
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert_eq!(Rating::new(6), Err(VisitError::RatingOutOfRange(6)));
    }

    #[test]
    fn order_type_parses_legacy_pint() {
        assert_eq!("Pint".parse::<OrderType>().unwrap(), OrderType::Beer);
        assert_eq!("wine".parse::<OrderType>().unwrap(), OrderType::Wine);
        assert!(matches!(
            "cider".parse::<OrderType>(),
            Err(VisitError::UnknownOrderType(_))
        ));
    }

    #[test]
    fn details_reject_blank_fields_and_half_coordinates() {
        let details = VisitDetails::new("  ", OrderType::Beer, "Lager");
        assert_eq!(details.validate(), Err(VisitError::EmptyEstablishment));

        let details = VisitDetails::new("The Crown", OrderType::Beer, "");
        assert_eq!(details.validate(), Err(VisitError::EmptyDrinkDetails));

        let mut details = VisitDetails::new("The Crown", OrderType::Beer, "Lager");
        details.latitude = Some(51.5);
        assert_eq!(details.validate(), Err(VisitError::PartialCoordinates));

        details.longitude = Some(-0.12);
        assert!(details.validate().is_ok());
    }

    #[test]
    fn rating_deserialization_is_checked() {
        assert!(serde_json::from_str::<Rating>("4").is_ok());
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }
}
