pub mod devices;
pub mod duplicate;
pub mod offline_cache;
pub mod reentry;
pub mod scan;
pub mod stats;
pub mod token;
pub mod zone;
