//! Integration tests for element operations on a loaded domain
//!
//! Creation, removal cascades, properties and enumeration through the
//! public `Store` / `Session` / `GraphProvider` surface.

use hyperstore::{
    ConstraintValidator, DiagnosticMessage, Direction, DomainModel, Element, GraphProvider, HyperGraphError,
    Identity, NodeType, SchemaElement, Session, SessionConfiguration, Store, TrackedElement, Value, ValueKind,
};
use std::sync::Arc;

fn id(key: &str) -> Identity {
    Identity::new("lib", key)
}

fn library(store: &Store) -> Arc<DomainModel> {
    let domain = store.load_domain("lib").unwrap();
    domain
        .register_schema(SchemaElement::entity(id("Library")).with_property("Name", ValueKind::String))
        .unwrap();
    domain
        .register_schema(
            SchemaElement::entity(id("Book"))
                .with_property("Title", ValueKind::String)
                .with_property_default("Copies", ValueKind::Integer, Value::Integer(1)),
        )
        .unwrap();
    domain
        .register_schema(SchemaElement::entity(id("Novel")).with_super_type(id("Book")))
        .unwrap();
    domain
        .register_schema(SchemaElement::relationship(id("LibraryHasBooks"), id("Library"), id("Book")).embedded())
        .unwrap();
    domain
        .register_schema(SchemaElement::relationship(id("Cites"), id("Book"), id("Book")))
        .unwrap();
    domain
        .register_schema(
            SchemaElement::relationship(id("Endorses"), id("Library"), id("Cites"))
                .with_property("Since", ValueKind::Integer),
        )
        .unwrap();
    domain
}

fn add_book(graph: &dyn GraphProvider, session: &Session, library: &str, book: &str, title: &str) {
    graph.create_entity(session, id(book), &id("Book")).unwrap();
    graph
        .set_property_value(session, &id(book), &id("Book"), "Title", title.into(), None)
        .unwrap();
    graph
        .create_relationship(
            session,
            id(&format!("{}-{}", library, book)),
            &id("LibraryHasBooks"),
            &id(library),
            &id("Library"),
            &id(book),
            &id("Book"),
        )
        .unwrap();
}

#[test]
fn test_committed_elements_visible_to_later_sessions() {
    let store = Store::default();
    let graph = library(&store).graph();

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    add_book(graph.as_ref(), &session, "main", "b1", "Dune");
    assert!(session.commit().is_committed());

    let session = store.begin_session(SessionConfiguration::new());
    let book = graph.get_element(&session, &id("B1")).unwrap().unwrap();
    assert_eq!(book.schema_id(), &id("Book"));
    let title = graph
        .get_property_value(&session, &id("b1"), &id("Book"), "Title")
        .unwrap();
    assert_eq!(title.value, Value::from("Dune"));
    assert_eq!(title.current_version, 1);
}

#[test]
fn test_aborted_session_leaves_no_trace() {
    let store = Store::default();
    let graph = library(&store).graph();

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    assert!(!session.abort().is_committed());

    let session = store.begin_session(SessionConfiguration::new());
    assert!(graph.get_graph_node(&session, &id("main"), false).unwrap().is_none());
}

#[test]
fn test_dropped_session_aborts() {
    let store = Store::default();
    let graph = library(&store).graph();
    {
        let session = store.begin_session(SessionConfiguration::new());
        graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    }
    assert!(store.locks().is_empty());
    let session = store.begin_session(SessionConfiguration::new());
    assert!(graph.get_graph_node(&session, &id("main"), false).unwrap().is_none());
}

#[test]
fn test_remove_library_cascades_to_embedded_books() {
    let store = Store::default();
    let graph = library(&store).graph();

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    for n in 0..5 {
        add_book(graph.as_ref(), &session, "main", &format!("b{}", n), "Untitled");
    }
    graph.create_entity(&session, id("loose"), &id("Book")).unwrap();
    graph
        .create_relationship(&session, id("c1"), &id("Cites"), &id("loose"), &id("Book"), &id("b0"), &id("Book"))
        .unwrap();
    session.commit();

    let session = store.begin_session(SessionConfiguration::new());
    assert!(graph.remove_entity(&session, &id("main"), &id("Library"), true).unwrap());
    let tracking = session.tracking();
    assert!(tracking.involved().count() >= 11);
    session.commit();

    let session = store.begin_session(SessionConfiguration::new());
    let books: Vec<Element> = graph
        .get_entities(&session, Some(&id("Book")), 0, false)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id(), &id("loose"));
    assert!(graph.get_edges(&session, &id("loose"), Direction::Outgoing, None).unwrap().is_empty());
}

#[test]
fn test_remove_single_embedded_book() {
    let store = Store::default();
    let domain = library(&store);
    let graph = domain.graph();

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    for key in ["b1", "b2", "b3"] {
        add_book(graph.as_ref(), &session, "main", key, "Untitled");
    }
    graph
        .create_relationship(&session, id("c1"), &id("Cites"), &id("b1"), &id("Book"), &id("b3"), &id("Book"))
        .unwrap();
    assert!(session.commit().is_committed());

    let session = store.begin_session(SessionConfiguration::new());
    assert!(graph.remove_entity(&session, &id("b1"), &id("Book"), true).unwrap());
    assert!(graph.remove_entity(&session, &id("b2"), &id("Book"), false).unwrap());
    assert!(session.commit().is_committed());

    let session = store.begin_session(SessionConfiguration::new());
    for key in ["b1", "b2", "main-b1", "main-b2", "c1"] {
        assert!(graph.get_graph_node(&session, &id(key), false).unwrap().is_none(), "{}", key);
    }
    let held = graph.get_edges(&session, &id("main"), Direction::Outgoing, None).unwrap();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].end_id, id("b3"));
    assert!(graph.get_edges(&session, &id("b3"), Direction::Incoming, None).unwrap().len() == 1);
    assert_eq!(domain.statistics().snapshot().entity_count(), 2);
}

#[test]
fn test_remove_missing_element() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new());

    assert!(!graph.remove_entity(&session, &id("ghost"), &id("Book"), false).unwrap());
    let err = graph.remove_entity(&session, &id("ghost"), &id("Book"), true).unwrap_err();
    assert!(matches!(err, HyperGraphError::InvalidElement(ref i) if i == &id("ghost")));
}

#[test]
fn test_relationship_between_relationships() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new());

    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
    graph.create_entity(&session, id("b2"), &id("Book")).unwrap();
    graph
        .create_relationship(&session, id("c1"), &id("Cites"), &id("b1"), &id("Book"), &id("b2"), &id("Book"))
        .unwrap();
    graph
        .create_relationship(&session, id("e1"), &id("Endorses"), &id("main"), &id("Library"), &id("c1"), &id("Cites"))
        .unwrap();
    graph
        .set_property_value(&session, &id("e1"), &id("Endorses"), "Since", 1999.into(), None)
        .unwrap();

    let endorsements = graph.get_edges(&session, &id("c1"), Direction::Incoming, None).unwrap();
    assert_eq!(endorsements.len(), 1);
    assert_eq!(endorsements[0].end_id, id("main"));

    // removing the citing book takes the citation and its endorsement along
    graph.remove_entity(&session, &id("b1"), &id("Book"), true).unwrap();
    assert!(graph.get_graph_node(&session, &id("e1"), false).unwrap().is_none());
    assert!(graph.get_edges(&session, &id("main"), Direction::Both, None).unwrap().is_empty());
    assert!(session.commit().is_committed());
}

#[test]
fn test_property_versions_and_defaults() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("b1"), &id("Book")).unwrap();

    let copies = graph
        .get_property_value(&session, &id("b1"), &id("Book"), "Copies")
        .unwrap();
    assert_eq!(copies.value, Value::Integer(1));
    assert!(!copies.has_value());

    let first = graph
        .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Dune".into(), Some(0))
        .unwrap();
    assert_eq!(first.current_version, 1);
    let second = graph
        .set_property_value(&session, &id("b1"), &id("Book"), "title", "Dune Messiah".into(), Some(1))
        .unwrap();
    assert_eq!(second.current_version, 2);
    assert_eq!(second.old_value, Value::from("Dune"));

    let err = graph
        .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Children of Dune".into(), Some(1))
        .unwrap_err();
    assert!(matches!(err, HyperGraphError::VersionConflict { expected: 1, actual: 2, .. }));

    let err = graph
        .set_property_value(&session, &id("b1"), &id("Book"), "Title", 42.into(), None)
        .unwrap_err();
    assert!(matches!(err, HyperGraphError::InvalidValue { .. }));

    let err = graph
        .set_property_value(&session, &id("b1"), &id("Book"), "Isbn", "x".into(), None)
        .unwrap_err();
    assert!(matches!(err, HyperGraphError::SchemaNotFound(_)));

    assert!(graph.remove_property_value(&session, &id("b1"), &id("Book"), "Title").unwrap());
    assert!(!graph.remove_property_value(&session, &id("b1"), &id("Book"), "Title").unwrap());
    let title = graph
        .get_property_value(&session, &id("b1"), &id("Book"), "Title")
        .unwrap();
    assert!(!title.has_value());
}

#[test]
fn test_enumeration_follows_inheritance_and_skip() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new());

    for n in 0..4 {
        graph.create_entity(&session, id(&format!("b{}", n)), &id("Book")).unwrap();
    }
    for n in 0..3 {
        graph.create_entity(&session, id(&format!("n{}", n)), &id("Novel")).unwrap();
    }
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();

    assert_eq!(graph.get_entities(&session, Some(&id("Book")), 0, false).count(), 7);
    assert_eq!(graph.get_entities(&session, Some(&id("Novel")), 0, false).count(), 3);
    assert_eq!(graph.get_entities(&session, None, 0, false).count(), 8);
    assert_eq!(graph.get_entities(&session, Some(&id("Book")), 5, false).count(), 2);
    assert_eq!(graph.get_relationships(&session, None, 0, false).count(), 0);
}

#[test]
fn test_find_relationships_by_endpoints() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new());

    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    add_book(graph.as_ref(), &session, "main", "b1", "Dune");
    add_book(graph.as_ref(), &session, "main", "b2", "Emma");
    graph
        .create_relationship(&session, id("c1"), &id("Cites"), &id("b1"), &id("Book"), &id("b2"), &id("Book"))
        .unwrap();

    let held = graph
        .find_relationships(&session, Some(&id("LibraryHasBooks")), Some(&id("main")), None)
        .unwrap();
    assert_eq!(held.len(), 2);
    let to_b2 = graph
        .find_relationships(&session, None, None, Some(&id("b2")))
        .unwrap();
    assert_eq!(to_b2.len(), 2);
    let citation = graph
        .find_relationships(&session, Some(&id("Cites")), Some(&id("b1")), Some(&id("b2")))
        .unwrap();
    assert_eq!(citation[0].id, id("c1"));
}

#[test]
fn test_read_only_session_rejects_writes() {
    let store = Store::default();
    let graph = library(&store).graph();
    let session = store.begin_session(SessionConfiguration::new().read_only());

    let err = graph.create_entity(&session, id("b1"), &id("Book")).unwrap_err();
    assert!(matches!(err, HyperGraphError::ReadOnlyViolation(_)));
}

#[test]
fn test_cross_domain_relationship() {
    let store = Store::default();
    let graph = library(&store).graph();
    let people = store.load_domain("people").unwrap();
    people
        .register_schema(SchemaElement::entity(Identity::new("people", "Person")))
        .unwrap();
    let schema = SchemaElement::relationship(id("WrittenBy"), id("Book"), Identity::new("people", "Person"));
    store.get_domain("lib").unwrap().register_schema(schema).unwrap();

    let session = store.begin_session(SessionConfiguration::new());
    let herbert = Identity::new("people", "herbert");
    people
        .graph()
        .create_entity(&session, herbert.clone(), &Identity::new("people", "Person"))
        .unwrap();
    graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
    graph
        .create_relationship(
            &session,
            id("w1"),
            &id("WrittenBy"),
            &id("b1"),
            &id("Book"),
            &herbert,
            &Identity::new("people", "Person"),
        )
        .unwrap();

    let err = graph
        .create_relationship(
            &session,
            id("w2"),
            &id("WrittenBy"),
            &id("b1"),
            &id("Book"),
            &Identity::new("people", "nobody"),
            &Identity::new("people", "Person"),
        )
        .unwrap_err();
    assert!(matches!(err, HyperGraphError::InvalidElement(_)));

    let tracking = session.tracking();
    let mut domains = tracking.domains();
    domains.sort();
    assert_eq!(domains, vec!["lib".to_string(), "people".to_string()]);
    assert!(session.commit().is_committed());
}

struct TitleRequired;

impl ConstraintValidator for TitleRequired {
    fn name(&self) -> &str {
        "TitleRequired"
    }

    fn implicit_validate(&self, session: &Session, element: &TrackedElement) -> Vec<DiagnosticMessage> {
        if element.kind != NodeType::Node || element.schema_id != id("Book") {
            return Vec::new();
        }
        let graph = session.store().domain_graph("lib").unwrap();
        let title = graph
            .get_property_value(session, &element.id, &element.schema_id, "Title")
            .unwrap();
        if title.has_value() {
            Vec::new()
        } else {
            vec![DiagnosticMessage::error("Title is required").for_element(element.id.clone())]
        }
    }
}

#[test]
fn test_constraint_violation_aborts_commit() {
    let store = Store::default();
    let graph = library(&store).graph();
    store.register_constraint(Arc::new(TitleRequired));

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
    let result = session.commit();
    assert!(!result.is_committed());
    assert!(result.has_errors());
    assert_eq!(result.errors().next().and_then(|m| m.id.clone()), Some(id("b1")));

    let session = store.begin_session(SessionConfiguration::new());
    assert!(graph.get_graph_node(&session, &id("b1"), false).unwrap().is_none());
    graph.create_entity(&session, id("b1"), &id("Book")).unwrap();
    graph
        .set_property_value(&session, &id("b1"), &id("Book"), "Title", "Dune".into(), None)
        .unwrap();
    assert!(session.commit().is_committed());
}

#[test]
fn test_statistics_follow_commits() {
    let store = Store::default();
    let domain = library(&store);
    let graph = domain.graph();

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("main"), &id("Library")).unwrap();
    add_book(graph.as_ref(), &session, "main", "b1", "Dune");
    assert_eq!(domain.statistics().snapshot().entity_count(), 0);
    session.commit();

    let stats = domain.statistics().snapshot();
    assert_eq!(stats.entity_count(), 2);
    assert_eq!(stats.relationship_count(), 1);
    assert_eq!(stats.property_writes, 1);
}
