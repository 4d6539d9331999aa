//! ft-core: stable foundation for flowtree.
//!
//! Contains:
//! - ids (stable compact IDs for nodes and connections)
//! - numeric (Real + tolerances + float helpers)
//! - geom (3-D points, lines, polylines and the predicates the tree relies on)
//! - error (shared error types)

pub mod error;
pub mod geom;
pub mod ids;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{FtError, FtResult};
pub use geom::{Line, Polyline, Vec3};
pub use ids::*;
pub use numeric::*;
