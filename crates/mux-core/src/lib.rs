//! # mux-core
//!
//! Shared types and configuration for gpumux.
//!
//! This crate holds everything the other gpumux crates agree on:
//! - The service catalog: [`ServiceDescriptor`], [`ServiceKind`], [`ServiceState`]
//! - The [`ServiceRegistry`] that answers phase and name lookups
//! - The [`ManagerConfig`] document loaded once at startup
//!
//! The catalog is immutable after load: every difference between deployments
//! comes from the configuration document, never from runtime mutation.

pub mod config;
pub mod error;
pub mod registry;
pub mod service;

pub use config::{ManagerConfig, ServiceEntry};
pub use error::{Error, Result};
pub use registry::ServiceRegistry;
pub use service::{ServiceDescriptor, ServiceKind, ServiceState};

/// Default VRAM held back for desktop/background consumers (MB).
pub const DEFAULT_VRAM_RESERVE_MB: u64 = 1024;

/// Default TTL for the GPU mutex, sized for long workflows (seconds).
pub const DEFAULT_LOCK_TTL_S: u64 = 600;

/// Pipeline phases run from 1 (crawl) through 5 (render).
pub const PHASE_RANGE: std::ops::RangeInclusive<u32> = 1..=5;
