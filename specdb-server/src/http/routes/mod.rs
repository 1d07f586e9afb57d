//! Route handlers organized by resource

pub mod debug;
pub mod export;
pub mod filters;
pub mod health;
pub mod images;
pub mod import;
pub mod legacy;
pub mod records;
pub mod report;
pub mod session;
