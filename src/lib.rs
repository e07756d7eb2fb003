//! Offline-first sign inventory: local store, reference-data cache, autosaved
//! drafts, and a durable queue replayed against the remote service.

pub mod cache;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod drafts;
pub mod inventory;
pub mod model;
pub mod outbox;
pub mod remote;
