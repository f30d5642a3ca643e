// Domain Layer - Entities and Value Objects

pub mod error;
pub mod geo;
pub mod request;
pub mod result;
pub mod worker;

pub use error::DomainError;
pub use geo::GeoPoint;
pub use request::{RequestId, RideRequest};
pub use result::{DriverId, MatchResult, UnmatchedReason};
pub use worker::{WorkerIdentity, WorkerState};
