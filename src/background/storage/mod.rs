//! Persistent state of the timer.
//!  - Everything lives in a single JSON document with two top-level keys, `sites` and
//!    `ignoredUntil`, mirroring the browser's key-value storage layout.
//!  - Each key is written independently through [site_storage::SiteStore], so a writer touching
//!    `sites` never clobbers a concurrent change to `ignoredUntil`.

pub mod entities;
pub mod site_storage;
