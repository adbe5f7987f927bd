//! The reminder and regional-signal pipeline, end to end: eligibility
//! selection, content generation, voice synthesis, delivery, coverage
//! aggregation and regional broadcast.

pub mod broadcast;
pub mod content;
pub mod coverage;
pub mod delivery;
pub mod eligibility;
pub mod reminders;
pub mod voice;
