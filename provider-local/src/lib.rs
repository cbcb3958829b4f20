//! # Local Sources
//!
//! [`SourceEnumerator`](bridge_traits::SourceEnumerator) implementations for
//! sources that live on the machine running the migration.
//!
//! ## Overview
//!
//! - [`LocalFsEnumerator`] walks a directory tree and yields every regular file
//! - [`UrlListEnumerator`] reads a text file holding one URL per line
//!
//! Both read their source once and then serve fixed-size pages from memory.
//! The continuation marker is the index of the first item of the next page, so
//! re-requesting a marker always yields the same page.
//!
//! Neither enumerator filters anything. Media type and excluded-directory rules
//! are applied by the engine when it seeds records.

pub mod error;
pub mod filesystem;
pub mod url_list;

mod paging;

pub use error::{LocalSourceError, Result};
pub use filesystem::LocalFsEnumerator;
pub use url_list::UrlListEnumerator;
