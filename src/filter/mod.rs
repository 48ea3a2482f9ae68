//! Protocol-control rule evaluation.
//!
//! Turns a device's rule snapshot into the weekly windows where every
//! protocol is dropped, and locates a reference instant against them:
//! normalize → resolve dominant slices → merge per day → merge across the
//! week → locate current/next. Everything here is pure.

pub mod dominant;
pub mod engine;
pub mod locator;
pub mod merge;
pub mod normalizer;

pub use dominant::resolve_dominant;
pub use engine::{compute_block_windows, schedule_at, WindowCache};
pub use locator::locate_schedule;
pub use merge::{merge_daily, merge_weekly, weekday_runs};
pub use normalizer::{enabled_rules, normalize_records, NormalizedRules};
