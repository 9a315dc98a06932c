pub mod alerts;
pub mod occupancy;
pub mod stop_bubble;
pub mod vehicle_bubble;
