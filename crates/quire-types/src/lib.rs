//! Shared identity, tenant and content-path types for quire.
//!
//! A pure leaf crate: no I/O, no internal quire dependencies.
//!
//! # Key Types
//!
//! |-------------------|----------------------------------------------|
//! | Type              | Purpose                                      |
//! |-------------------|----------------------------------------------|
//! | [`UserId`]        | Which user (UUIDv7)                          |
//! | [`SiteId`]        | Which site (UUIDv7)                          |
//! | [`SitePrefix`]    | Tenant segment: `""`, `@name`, or a domain   |
//! | [`ContentKind`]   | Top-level content folder                     |
//! |-------------------|----------------------------------------------|

pub mod ids;
pub mod path;
pub mod site;

pub use ids::{SiteId, UserId};
pub use path::{ASSET_EXTENSIONS, ContentKind, PathError, clean_path, is_asset_name};
pub use site::{Route, SitePrefix, is_site_prefix, resolve, resolve_url_path};
