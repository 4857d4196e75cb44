//! Halftone cell orders, tile caching and band-list transport
//!
//! Builds halftone cells from screen parameters or threshold arrays, renders
//! and caches the tile for every gray level, installs per-component
//! halftone sets into a rendering context, and serializes installed sets so
//! that independent workers can rebuild them.
//! This library exposes modules for integration testing.

pub mod assets;
pub mod cache;
pub mod codec;
pub mod color;
pub mod error;
pub mod halftone;
pub mod memory;
pub mod models;
pub mod order;
pub mod rendering;
pub mod services;
pub mod transfer;
