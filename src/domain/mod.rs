pub mod attendance;
pub mod breaks;
pub mod geofence;
pub mod leave;
pub mod reporting;
pub mod time_utils;
pub mod timer;
