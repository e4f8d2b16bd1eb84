pub mod device;
pub mod event;
pub mod offline_cache;
pub mod reentry_policy;
pub mod scan_attempt;
pub mod ticket;

pub use device::{DeviceType, ScannerDevice};
pub use event::Event;
pub use offline_cache::OfflineCacheEntry;
pub use reentry_policy::ReentryPolicy;
pub use scan_attempt::{DenyReason, ScanAttempt, ScanResult};
pub use ticket::{Ticket, TicketStatus, Zone};
