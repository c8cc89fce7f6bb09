//! # Repositories
//!
//! One repository per table. Repositories own a pool clone and are handed
//! out by [`Database`](crate::Database) accessors.

pub mod kv;
