//! Application services: storage backends, the upload pipeline, catalog
//! administration, album paging and sessions.

pub mod catalog;
pub mod lightbox;
pub mod object_store;
pub mod pager;
pub mod row_store;
pub mod session;
pub mod storage_service;
pub mod upload;

#[cfg(test)]
mod upload_tests;
