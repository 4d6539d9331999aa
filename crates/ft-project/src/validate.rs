//! Network file validation logic.

use crate::schema::{ConnectionDef, GridDef, NetworkDef, NodeKind, PointDef};
use std::collections::{HashMap, HashSet};

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate ID: {id} in {context}")]
    DuplicateId { id: String, context: String },

    #[error("Missing reference: {id} in {context}")]
    MissingReference { id: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

#[derive(Clone, Copy, PartialEq)]
enum Role {
    Outlet,
    Inlet,
    Internal,
}

pub fn validate_network(network: &NetworkDef) -> Result<(), ValidationError> {
    if network.version > crate::schema::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: network.version,
        });
    }

    if let Some(tol) = network.tolerance {
        validate_positive("tolerance", tol)?;
    }
    validate_point("outlet position", &network.outlet.position)?;
    validate_flow("outlet flow", network.outlet.flow)?;

    let mut roles: HashMap<&str, Role> = HashMap::new();
    roles.insert(&network.outlet.id, Role::Outlet);
    for node in &network.nodes {
        let role = match node.kind {
            NodeKind::Inlet { flow, .. } => {
                validate_flow(&format!("node '{}' flow", node.id), flow)?;
                Role::Inlet
            }
            NodeKind::Internal => Role::Internal,
        };
        if roles.insert(&node.id, role).is_some() {
            return Err(ValidationError::DuplicateId {
                id: node.id.clone(),
                context: "nodes".to_string(),
            });
        }
        validate_point(&format!("node '{}' position", node.id), &node.position)?;
    }

    let mut main_outgoing = HashSet::new();
    for conn in &network.connections {
        validate_connection(conn, &roles)?;
        if !conn.is_loop && !main_outgoing.insert(conn.from.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: format!("connection {} -> {}", conn.from, conn.to),
                value: conn.from.clone(),
                reason: "node already has a main outgoing connection".to_string(),
            });
        }
    }

    if let Some(grid) = &network.grid {
        validate_grid(grid)?;
    }

    Ok(())
}

fn validate_connection(
    conn: &ConnectionDef,
    roles: &HashMap<&str, Role>,
) -> Result<(), ValidationError> {
    let context = format!("connection {} -> {}", conn.from, conn.to);
    let from = roles
        .get(conn.from.as_str())
        .ok_or_else(|| ValidationError::MissingReference {
            id: conn.from.clone(),
            context: context.clone(),
        })?;
    let to = roles
        .get(conn.to.as_str())
        .ok_or_else(|| ValidationError::MissingReference {
            id: conn.to.clone(),
            context: context.clone(),
        })?;

    if *from == Role::Outlet {
        return Err(ValidationError::InvalidValue {
            field: context,
            value: conn.from.clone(),
            reason: "the outlet cannot start a connection".to_string(),
        });
    }
    if *to == Role::Inlet {
        return Err(ValidationError::InvalidValue {
            field: context,
            value: conn.to.clone(),
            reason: "an inlet cannot end a connection".to_string(),
        });
    }
    if conn.from == conn.to {
        return Err(ValidationError::InvalidValue {
            field: context,
            value: conn.from.clone(),
            reason: "connection starts and ends at the same node".to_string(),
        });
    }
    if !conn.diameter.is_finite() || conn.diameter < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: format!("{context} diameter"),
            value: conn.diameter.to_string(),
            reason: "must be finite and non-negative".to_string(),
        });
    }
    Ok(())
}

fn validate_grid(grid: &GridDef) -> Result<(), ValidationError> {
    if let Some(tol) = grid.tolerance {
        validate_positive("grid tolerance", tol)?;
    }

    let mut vertex_ids = HashSet::new();
    for vertex in &grid.vertices {
        if !vertex_ids.insert(vertex.id) {
            return Err(ValidationError::DuplicateId {
                id: vertex.id.to_string(),
                context: "grid vertices".to_string(),
            });
        }
        validate_point(&format!("grid vertex {} position", vertex.id), &vertex.position)?;
    }

    let missing = |id: u64, context: &str| ValidationError::MissingReference {
        id: id.to_string(),
        context: context.to_string(),
    };
    let mut routed = HashSet::new();
    for step in &grid.route {
        if !vertex_ids.contains(&step.vertex) {
            return Err(missing(step.vertex, "grid route vertex"));
        }
        if !routed.insert(step.vertex) {
            return Err(ValidationError::DuplicateId {
                id: step.vertex.to_string(),
                context: "grid route".to_string(),
            });
        }
        if let Some(trunk) = step.trunk {
            if !vertex_ids.contains(&trunk) {
                return Err(missing(trunk, "grid route trunk"));
            }
        }
    }
    for path in &grid.loops {
        if let Some(id) = path.iter().find(|id| !vertex_ids.contains(id)) {
            return Err(missing(*id, "grid loop"));
        }
    }
    Ok(())
}

fn validate_point(field: &str, point: &PointDef) -> Result<(), ValidationError> {
    if point.iter().all(|v| v.is_finite()) {
        return Ok(());
    }
    Err(ValidationError::InvalidValue {
        field: field.to_string(),
        value: format!("{point:?}"),
        reason: "coordinates must be finite".to_string(),
    })
}

fn validate_flow(field: &str, flow: f64) -> Result<(), ValidationError> {
    if flow.is_finite() && flow >= 0.0 {
        return Ok(());
    }
    Err(ValidationError::InvalidValue {
        field: field.to_string(),
        value: flow.to_string(),
        reason: "must be finite and non-negative".to_string(),
    })
}

fn validate_positive(field: &str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: "must be positive".to_string(),
    })
}
