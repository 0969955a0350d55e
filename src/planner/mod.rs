pub mod params;
pub mod plan;
pub mod router;
