#![allow(clippy::type_complexity)]

//! Cross-namespace shared cache fan-out.
//!
//! Presents a single logical cache per resource type over a dynamic,
//! mutable subset of namespaces, built from a fleet of per-namespace child
//! informers. See [`factory::Factory`] for the entry point and
//! [`multi_namespace_informer::MultiNamespaceInformer`] for the component
//! that does the actual fan-out.

pub mod adapter;
pub mod cache_reader;
pub mod config;
pub mod converter;
pub mod error;
pub mod factory;
pub mod fake;
pub mod lister;
mod metrics;
pub mod multi_namespace_informer;
pub mod namespace_set;
pub mod types;

pub use error::{Error, Result};
