pub mod visit;

pub use visit::{OrderType, Rating, VisitDetails, VisitError, VisitRecord};
