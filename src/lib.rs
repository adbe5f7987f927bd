//! Pediatric vaccination reminders and regional coverage signals for the
//! Moroccan immunisation schedule.

pub mod config;
pub mod db;
pub mod language;
pub mod pipeline;
pub mod schedule;
pub mod scheduler;
