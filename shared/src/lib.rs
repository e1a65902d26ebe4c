//! Shared domain types and persistence for the ContentHub comment platform.
//!
//! The comment table is owned by this crate; every service that renders or
//! mutates comments goes through [`comment_store::CommentStore`] rather than
//! issuing its own SQL.

pub mod comment_store;
