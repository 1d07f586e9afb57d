//! Request and response models shared by the routes

pub mod pagination;

pub use pagination::{Cursor, KeysetPage, Paginated, Pagination, PaginationParams};
