pub mod coalesce;
pub mod names;
pub mod rate_limiter;
pub mod threads;
