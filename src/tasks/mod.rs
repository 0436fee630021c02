//! Background Tasks Module
//!
//! Contains the background machinery that runs periodically while regions
//! are alive.
//!
//! # Tasks
//! - Shared scheduler: one periodic runner for every region
//! - Shrinker: reclaims expired and idle elements from one region

mod scheduler;
mod shrinker;

pub use scheduler::{PeriodicTask, ScheduledTask, SharedScheduler};
pub use shrinker::{is_reclaimable, shrink, Shrinker, ShrinkerRunStats};
