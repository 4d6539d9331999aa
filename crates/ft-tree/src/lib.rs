//! ft-tree: the flow tree model for flowtree.
//!
//! Provides:
//! - Tree container with node/connection arenas and incremental adjacency
//! - Geometric ordering of connections at a node (`ConnectionComparer`)
//! - Derived sections with aggregated flow
//! - Cycle enumeration and overlap validation
//! - Path editors (chamfer, simplify, heal, vertical drops, normalization)
//! - Splicing routes found on an external grid into the tree
//!
//! # Example
//!
//! ```
//! use ft_core::geom::vec3;
//! use ft_tree::Tree;
//!
//! let mut tree = Tree::new(["zone-1"]);
//! tree.add_inlet(vec3(0.0, 10.0, 0.0), 2.0, None, None).unwrap();
//! let sections = tree.sections(false, false).unwrap();
//!
//! assert_eq!(sections.len(), 1);
//! assert_eq!(sections[0].flow, 2.0);
//! ```

pub mod adjust;
pub mod compare;
pub mod cycles;
pub mod edit;
pub mod error;
pub mod graph;
pub mod routing;
pub mod sections;
pub mod tree;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use adjust::{PREFERRED_TURN_ANGLES, force_angle_compliance};
pub use compare::ConnectionComparer;
pub use cycles::ValidationIssue;
pub use edit::NormalizationMode;
pub use error::{TreeError, TreeResult};
pub use graph::{Connection, ConnectionLocator, Node, NodeKind, Split};
pub use routing::{GridGraph, RouteOutcome, RoutingGrid};
pub use sections::{ROOT_SECTION_KEY, Section, trunk_side_key};
pub use tree::Tree;
