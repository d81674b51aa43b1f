//! Domain commands
//!
//! Cascading operations do not call back into the graph directly. They build
//! a list of commands and hand it to the session, which routes each command
//! to the graph owning its target identity.

use super::Session;
use crate::error::HyperGraphResult;
use crate::graph::{GraphProvider, Identity, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainCommand {
    CreateEntity {
        id: Identity,
        schema_id: Identity,
    },
    CreateRelationship {
        id: Identity,
        schema_id: Identity,
        start_id: Identity,
        start_schema_id: Identity,
        end_id: Identity,
        end_schema_id: Identity,
    },
    RemoveEntity {
        id: Identity,
        schema_id: Identity,
        throw_if_missing: bool,
    },
    RemoveRelationship {
        id: Identity,
        schema_id: Identity,
        throw_if_missing: bool,
    },
    SetProperty {
        owner_id: Identity,
        owner_schema_id: Identity,
        property: String,
        value: Value,
        expected_version: Option<i64>,
    },
    RemoveProperty {
        owner_id: Identity,
        owner_schema_id: Identity,
        property: String,
    },
}

impl DomainCommand {
    /// Identity whose domain decides where the command runs
    pub fn target(&self) -> &Identity {
        match self {
            DomainCommand::CreateEntity { id, .. }
            | DomainCommand::CreateRelationship { id, .. }
            | DomainCommand::RemoveEntity { id, .. }
            | DomainCommand::RemoveRelationship { id, .. } => id,
            DomainCommand::SetProperty { owner_id, .. }
            | DomainCommand::RemoveProperty { owner_id, .. } => owner_id,
        }
    }

    pub fn domain_name(&self) -> &str {
        self.target().domain_name()
    }

    /// Run the command against `graph`
    pub fn apply(&self, graph: &dyn GraphProvider, session: &Session) -> HyperGraphResult<()> {
        match self {
            DomainCommand::CreateEntity { id, schema_id } => {
                graph.create_entity(session, id.clone(), schema_id)?;
            }
            DomainCommand::CreateRelationship {
                id,
                schema_id,
                start_id,
                start_schema_id,
                end_id,
                end_schema_id,
            } => {
                graph.create_relationship(
                    session,
                    id.clone(),
                    schema_id,
                    start_id,
                    start_schema_id,
                    end_id,
                    end_schema_id,
                )?;
            }
            DomainCommand::RemoveEntity {
                id,
                schema_id,
                throw_if_missing,
            } => {
                graph.remove_entity(session, id, schema_id, *throw_if_missing)?;
            }
            DomainCommand::RemoveRelationship {
                id,
                schema_id,
                throw_if_missing,
            } => {
                graph.remove_relationship(session, id, schema_id, *throw_if_missing)?;
            }
            DomainCommand::SetProperty {
                owner_id,
                owner_schema_id,
                property,
                value,
                expected_version,
            } => {
                graph.set_property_value(
                    session,
                    owner_id,
                    owner_schema_id,
                    property,
                    value.clone(),
                    *expected_version,
                )?;
            }
            DomainCommand::RemoveProperty {
                owner_id,
                owner_schema_id,
                property,
            } => {
                graph.remove_property_value(session, owner_id, owner_schema_id, property)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for DomainCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainCommand::CreateEntity { id, .. } => write!(f, "CreateEntity {}", id),
            DomainCommand::CreateRelationship { id, .. } => write!(f, "CreateRelationship {}", id),
            DomainCommand::RemoveEntity { id, .. } => write!(f, "RemoveEntity {}", id),
            DomainCommand::RemoveRelationship { id, .. } => write!(f, "RemoveRelationship {}", id),
            DomainCommand::SetProperty { owner_id, property, .. } => {
                write!(f, "SetProperty {}.{}", owner_id, property)
            }
            DomainCommand::RemoveProperty { owner_id, property, .. } => {
                write!(f, "RemoveProperty {}.{}", owner_id, property)
            }
        }
    }
}
