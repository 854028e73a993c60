//! Market quote collection -- browser-driven CSV downloads and imports.

pub mod browser;
pub mod files;
pub mod service;
