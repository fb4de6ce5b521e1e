//! hoard backup crate: ships the local database file to an off-site
//! channel on a timer and restores it on a cold start.

pub mod channel;
pub mod controller;

pub use channel::{BackupChannel, ChannelDocument, DirectoryChannel};
pub use controller::{BackupController, RestoreOutcome};
