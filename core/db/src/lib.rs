//! Encrypted catalog database.
//!
//! A database is a directory holding three encrypted collection files, an
//! encrypted settings blob, and per-item encrypted attachments. This crate
//! ties the crypto and store layers together into sessions, repositories
//! and the maintenance operations (password rotation, repair, backup).

pub mod backup;
pub mod manager;
pub mod models;
pub mod repair;
pub mod repository;
pub mod rotation;
pub mod session;
pub mod settings;

pub use backup::{create_backup, MAX_SNAPSHOTS};
pub use manager::{create, unlock, CreateOutcome, UnlockOutcome};
pub use models::{Category, CategoryRef, Item, Screenshot, Tag};
pub use repair::{repair, RepairReport};
pub use repository::{
    CategoryFilter, CategoryRepository, ItemFilters, ItemRepository, ItemSort, TagRepository,
};
pub use rotation::{purge_rollback, rotate_password, RotationReport};
pub use session::{DatabaseSession, MaintenanceGuard};
pub use settings::{ClickAction, DatabaseSettings, LinkVisibility, SettingsStore};
