//! Call scheduling: extraction of the next slot from conversations,
//! relative-date resolution, timezone helpers and booking lookups.

pub mod extractor;
pub mod lookup;
pub mod reconcile;
pub mod resolve;
pub mod service;
pub mod timezone;
pub mod validate;

pub use extractor::{SchedulingExtractor, SchedulingSource};
pub use lookup::{CallClassification, UpcomingCall, lookup_call_type, upcoming_scheduled_call};
pub use reconcile::reconcile_scheduled_calls;
pub use service::{Confirmation, SchedulingService};
pub use validate::{Extraction, ScheduleDecision};
