//! mesh-injector - sidecar injection for App Mesh style service meshes
//!
//! Mutates pod specifications at admission time so that workloads join the
//! mesh: an Envoy sidecar, traffic interception, optional tracing sidecars and
//! a handful of pod-level adjustments.
//!
//! # Modules
//!
//! - [`inject`] - The injection pipeline, its configuration and annotation surface
//!
//! Mesh snapshots, templates, resource quantities and error types live in
//! [`mesh_injector_common`] and are re-exported here for convenience.

#![deny(missing_docs)]

pub mod inject;

pub use inject::{ClusterIdentity, InjectConfig, SidecarInjector};
pub use mesh_injector_common::mesh;
pub use mesh_injector_common::{Error, Result};
