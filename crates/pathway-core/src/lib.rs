//! Core types for the pathway course-flow builder.
//!
//! Provides the course graph model ([`graph::GraphModel`]), reachability and
//! duration aggregation, left-to-right layered layout, snapshot history, the
//! persisted course document, and the course repository contract with a
//! file-backed implementation.

pub mod catalog;
pub mod config;
pub mod export;
pub mod graph;
pub mod history;
pub mod layout;
pub mod reachability;
pub mod repository;
pub mod schema;
pub mod storage;
