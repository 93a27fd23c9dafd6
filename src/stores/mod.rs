//! Persistent stores (§4.3): favourites, recent scans, and user settings,
//! all built on one generic atomic JSON store.
//!
//! Grounded on the host's `db_connection`/`init_db` pattern in `main.rs`,
//! which centralises every on-disk access behind a single function per
//! concern; here the WAL-backed `rusqlite::Connection` is replaced by a
//! plain JSON blob per store, since none of the three need relational
//! queries or the host's crash-consistency guarantees beyond atomic
//! replace.

mod favorites;
mod json_store;
mod recent;
mod settings;

pub use favorites::Favorites;
pub use json_store::{JsonStore, StoreError};
pub use recent::RecentScans;
pub use settings::{ScanDefaults, Settings, SettingsObserver, UserSettings};
