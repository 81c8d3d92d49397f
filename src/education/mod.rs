//! Education screens: event logging and its HTTP surface.

pub mod logger;
pub mod routes;

pub use logger::{EducationAction, EducationLogger};
pub use routes::{EducationRouteState, education_routes};
