//! Graph access trait
//!
//! [`GraphProvider`] is implemented by the plain [`HyperGraph`](super::HyperGraph)
//! and by the domain extension overlay. Both expose the same mutations and
//! record-level reads; the typed, schema-filtered enumerations are built on
//! top of those reads once, here.

use super::edge::EdgeInfo;
use super::element::{Element, Relationship};
use super::node::GraphNode;
use super::property::{PropertyValue, Value};
use super::types::{Direction, Identity, NodeType};
use crate::domain::schema::SchemaProvider;
use crate::error::HyperGraphResult;
use crate::session::Session;
use std::sync::Arc;

/// Stream of candidate records
pub type NodeIter<'a> = Box<dyn Iterator<Item = Arc<GraphNode>> + 'a>;

pub trait GraphProvider: Send + Sync {
    /// Domain whose identities this graph owns
    fn domain_name(&self) -> &str;

    fn schema(&self) -> Arc<dyn SchemaProvider>;

    /// Set once the domain (or extension) has been unloaded
    fn is_disposed(&self) -> bool;

    fn as_provider(&self) -> &dyn GraphProvider;

    fn create_entity(
        &self,
        session: &Session,
        id: Identity,
        schema_id: &Identity,
    ) -> HyperGraphResult<Arc<GraphNode>>;

    #[allow(clippy::too_many_arguments)]
    fn create_relationship(
        &self,
        session: &Session,
        id: Identity,
        schema_id: &Identity,
        start_id: &Identity,
        start_schema_id: &Identity,
        end_id: &Identity,
        end_schema_id: &Identity,
    ) -> HyperGraphResult<Arc<GraphNode>>;

    /// Remove an entity and everything depending on it
    fn remove_entity(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool>;

    fn remove_relationship(
        &self,
        session: &Session,
        id: &Identity,
        schema_id: &Identity,
        throw_if_missing: bool,
    ) -> HyperGraphResult<bool>;

    /// Entity or relationship record. `local_only` skips any underlying
    /// layer (base domain or backing adapter).
    fn get_graph_node(
        &self,
        session: &Session,
        id: &Identity,
        local_only: bool,
    ) -> HyperGraphResult<Option<Arc<GraphNode>>>;

    /// Candidate records of `kind`. `schema_id` is a hint for backing
    /// stores; callers still filter by schema.
    fn get_graph_nodes<'a>(
        &'a self,
        session: &'a Session,
        kind: NodeType,
        schema_id: Option<&Identity>,
        local_only: bool,
    ) -> NodeIter<'a>;

    fn get_edges(
        &self,
        session: &Session,
        id: &Identity,
        direction: Direction,
        schema_id: Option<&Identity>,
    ) -> HyperGraphResult<Vec<EdgeInfo>>;

    fn get_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> HyperGraphResult<PropertyValue>;

    /// Write a property. With `expected_version` the write only succeeds if
    /// the stored version still matches; `None` writes over the latest one.
    fn set_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
        value: Value,
        expected_version: Option<i64>,
    ) -> HyperGraphResult<PropertyValue>;

    fn remove_property_value(
        &self,
        session: &Session,
        owner_id: &Identity,
        owner_schema_id: &Identity,
        property: &str,
    ) -> HyperGraphResult<bool>;

    fn get_element(&self, session: &Session, id: &Identity) -> HyperGraphResult<Option<Element>> {
        let Some(node) = self.get_graph_node(session, id, false)? else {
            return Ok(None);
        };
        let schema = self.schema().try_get_schema_element(&node.schema_id)?;
        Ok(schema.deserialize(&node))
    }

    /// Entities whose schema is-a `schema_id`, skipping the first `skip`
    /// matches. Each call starts a fresh enumeration.
    fn get_entities<'a>(
        &'a self,
        session: &'a Session,
        schema_id: Option<&Identity>,
        skip: usize,
        local_only: bool,
    ) -> ElementIter<'a> {
        ElementIter::new(self.as_provider(), session, NodeType::Node, schema_id, skip, local_only)
    }

    fn get_relationships<'a>(
        &'a self,
        session: &'a Session,
        schema_id: Option<&Identity>,
        skip: usize,
        local_only: bool,
    ) -> ElementIter<'a> {
        ElementIter::new(self.as_provider(), session, NodeType::Edge, schema_id, skip, local_only)
    }

    /// Relationships filtered by schema and endpoints. With a start the
    /// search follows its outgoing edges instead of scanning every record.
    fn find_relationships(
        &self,
        session: &Session,
        schema_id: Option<&Identity>,
        start_id: Option<&Identity>,
        end_id: Option<&Identity>,
    ) -> HyperGraphResult<Vec<Relationship>> {
        let matches_end = |r: &Relationship| end_id.map_or(true, |end| &r.end_id == end);

        if let Some(start) = start_id {
            let mut result = Vec::new();
            for edge in self.get_edges(session, start, Direction::Outgoing, schema_id)? {
                session.check_cancelled()?;
                if let Some(Element::Relationship(r)) = self.get_element(session, &edge.id)? {
                    if matches_end(&r) {
                        result.push(r);
                    }
                }
            }
            return Ok(result);
        }

        let mut result = Vec::new();
        for element in self.get_relationships(session, schema_id, 0, false) {
            if let Element::Relationship(r) = element? {
                if matches_end(&r) {
                    result.push(r);
                }
            }
        }
        Ok(result)
    }
}

/// Lazy, schema-filtered enumeration of elements
///
/// Candidates are resolved again through the graph before being handed out,
/// which takes the read lock a `Serializable` session needs and drops records
/// removed since the candidate list was captured.
pub struct ElementIter<'a> {
    graph: &'a dyn GraphProvider,
    session: &'a Session,
    schema: Arc<dyn SchemaProvider>,
    candidates: NodeIter<'a>,
    filter: Option<Identity>,
    local_only: bool,
    skip: usize,
    done: bool,
}

impl<'a> ElementIter<'a> {
    fn new(
        graph: &'a dyn GraphProvider,
        session: &'a Session,
        kind: NodeType,
        schema_id: Option<&Identity>,
        skip: usize,
        local_only: bool,
    ) -> Self {
        ElementIter {
            graph,
            session,
            schema: graph.schema(),
            candidates: graph.get_graph_nodes(session, kind, schema_id, local_only),
            filter: schema_id.cloned(),
            local_only,
            skip,
            done: false,
        }
    }

    fn fail(&mut self, err: crate::error::HyperGraphError) -> Option<HyperGraphResult<Element>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = HyperGraphResult<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Err(err) = self.session.check_cancelled() {
                return self.fail(err);
            }
            if self.graph.is_disposed() {
                let domain_name = self.graph.domain_name().to_string();
                return self.fail(crate::error::HyperGraphError::DomainUnloaded(domain_name));
            }

            let candidate = self.candidates.next()?;
            let Some(schema) = self.schema.get_schema_element(&candidate.schema_id) else {
                continue;
            };
            if let Some(filter) = &self.filter {
                if !self.schema.is_a(&candidate.schema_id, filter) {
                    continue;
                }
            }

            // candidates removed since enumeration started do not count
            let node = match self.graph.get_graph_node(self.session, &candidate.id, self.local_only) {
                Ok(Some(node)) => node,
                Ok(None) => continue,
                Err(err) => return self.fail(err),
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(element) = schema.deserialize(&node) {
                return Some(Ok(element));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{DomainSchema, SchemaElement};
    use crate::domain::Store;
    use crate::graph::HyperGraph;
    use crate::session::SessionConfiguration;

    fn id(key: &str) -> Identity {
        Identity::new("lib", key)
    }

    /// Lists every record but no longer resolves `hidden`, like a record
    /// removed while an enumeration is running
    struct Vanishing {
        inner: HyperGraph,
        hidden: Identity,
    }

    impl GraphProvider for Vanishing {
        fn domain_name(&self) -> &str {
            self.inner.domain_name()
        }

        fn schema(&self) -> Arc<dyn SchemaProvider> {
            self.inner.schema()
        }

        fn is_disposed(&self) -> bool {
            self.inner.is_disposed()
        }

        fn as_provider(&self) -> &dyn GraphProvider {
            self
        }

        fn create_entity(&self, session: &Session, id: Identity, schema_id: &Identity) -> HyperGraphResult<Arc<GraphNode>> {
            self.inner.create_entity(session, id, schema_id)
        }

        fn create_relationship(
            &self,
            session: &Session,
            id: Identity,
            schema_id: &Identity,
            start_id: &Identity,
            start_schema_id: &Identity,
            end_id: &Identity,
            end_schema_id: &Identity,
        ) -> HyperGraphResult<Arc<GraphNode>> {
            self.inner
                .create_relationship(session, id, schema_id, start_id, start_schema_id, end_id, end_schema_id)
        }

        fn remove_entity(&self, session: &Session, id: &Identity, schema_id: &Identity, throw: bool) -> HyperGraphResult<bool> {
            self.inner.remove_entity(session, id, schema_id, throw)
        }

        fn remove_relationship(
            &self,
            session: &Session,
            id: &Identity,
            schema_id: &Identity,
            throw: bool,
        ) -> HyperGraphResult<bool> {
            self.inner.remove_relationship(session, id, schema_id, throw)
        }

        fn get_graph_node(
            &self,
            session: &Session,
            id: &Identity,
            local_only: bool,
        ) -> HyperGraphResult<Option<Arc<GraphNode>>> {
            if id == &self.hidden {
                return Ok(None);
            }
            self.inner.get_graph_node(session, id, local_only)
        }

        fn get_graph_nodes<'a>(
            &'a self,
            session: &'a Session,
            kind: NodeType,
            schema_id: Option<&Identity>,
            local_only: bool,
        ) -> NodeIter<'a> {
            self.inner.get_graph_nodes(session, kind, schema_id, local_only)
        }

        fn get_edges(
            &self,
            session: &Session,
            id: &Identity,
            direction: Direction,
            schema_id: Option<&Identity>,
        ) -> HyperGraphResult<Vec<EdgeInfo>> {
            self.inner.get_edges(session, id, direction, schema_id)
        }

        fn get_property_value(
            &self,
            session: &Session,
            owner_id: &Identity,
            owner_schema_id: &Identity,
            property: &str,
        ) -> HyperGraphResult<PropertyValue> {
            self.inner.get_property_value(session, owner_id, owner_schema_id, property)
        }

        fn set_property_value(
            &self,
            session: &Session,
            owner_id: &Identity,
            owner_schema_id: &Identity,
            property: &str,
            value: Value,
            expected_version: Option<i64>,
        ) -> HyperGraphResult<PropertyValue> {
            self.inner
                .set_property_value(session, owner_id, owner_schema_id, property, value, expected_version)
        }

        fn remove_property_value(
            &self,
            session: &Session,
            owner_id: &Identity,
            owner_schema_id: &Identity,
            property: &str,
        ) -> HyperGraphResult<bool> {
            self.inner.remove_property_value(session, owner_id, owner_schema_id, property)
        }
    }

    fn books(store: &Store, hidden: &str) -> Vanishing {
        let schema = DomainSchema::new("lib");
        schema.register(SchemaElement::entity(id("Book"))).unwrap();
        let graph = Vanishing {
            inner: HyperGraph::new("lib", Arc::new(schema), store.config()),
            hidden: id(hidden),
        };
        let session = store.begin_session(SessionConfiguration::new());
        for key in ["b1", "b2", "b3"] {
            graph.create_entity(&session, id(key), &id("Book")).unwrap();
        }
        assert!(session.commit().is_committed());
        graph
    }

    #[test]
    fn test_skip_counts_only_resolved_elements() {
        let store = Store::default();
        let graph = books(&store, "b1");
        let session = store.begin_session(SessionConfiguration::new());

        let all: Vec<Identity> = graph
            .get_entities(&session, Some(&id("Book")), 0, false)
            .map(|e| e.unwrap().id().clone())
            .collect();
        assert_eq!(all, vec![id("b2"), id("b3")]);

        let paged: Vec<Identity> = graph
            .get_entities(&session, Some(&id("Book")), 1, false)
            .map(|e| e.unwrap().id().clone())
            .collect();
        assert_eq!(paged, vec![id("b3")]);
    }

    #[test]
    fn test_cancelled_enumeration() {
        let store = Store::default();
        let graph = books(&store, "none");
        let session = store.begin_session(SessionConfiguration::new());

        let mut elements = graph.get_entities(&session, None, 0, false);
        assert!(elements.next().unwrap().is_ok());
        session.cancellation().cancel();
        assert!(matches!(elements.next(), Some(Err(crate::error::HyperGraphError::Cancelled))));
        assert!(elements.next().is_none());
    }
}
