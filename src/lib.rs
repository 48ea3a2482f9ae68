//! Turns a device's protocol-control rules into the weekly windows where all
//! of its traffic is dropped, and keeps the router's single MAC block rule
//! for that device matching the window in effect.

pub mod config;
pub mod filter;
pub mod models;
pub mod reconcile;
pub mod router;
pub mod utils;
