//! Platform abstraction layer: mounted volumes and capacity queries.

pub mod pal;
