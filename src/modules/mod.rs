//! Modules layer - Infrastructure components for external integrations
//!
//! Contains the storage providers and the manager that dispatches to them.

pub mod storage;
