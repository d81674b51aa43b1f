//! Hyperstore demo
//!
//! Loads a small library domain from an in-memory adapter, edits it in a
//! session checked by a constraint, then works in a domain extension and
//! unloads it again.

use hyperstore::domain::DomainService;
use hyperstore::{
    ConstraintValidator, DiagnosticMessage, ExtendedMode, GraphProvider, Identity, InMemoryAdapter,
    NodeType, SchemaElement, Session, SessionConfiguration, Store, StoreConfig, TrackedElement, Value,
    ValueKind,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DOMAIN: &str = "library";

fn id(key: &str) -> Identity {
    Identity::new(DOMAIN, key)
}

/// Books must have a title
struct TitleRequired;

impl ConstraintValidator for TitleRequired {
    fn name(&self) -> &str {
        "TitleRequired"
    }

    fn implicit_validate(&self, session: &Session, element: &TrackedElement) -> Vec<DiagnosticMessage> {
        if element.kind != NodeType::Node || element.schema_id != id("Book") {
            return Vec::new();
        }
        let title = session
            .store()
            .domain_graph(element.id.domain_name())
            .and_then(|graph| graph.get_property_value(session, &element.id, &element.schema_id, "Title"));
        match title {
            Ok(title) if title.has_value() => Vec::new(),
            _ => vec![DiagnosticMessage::error("A book needs a title")
                .for_element(element.id.clone())
                .for_property("Title")],
        }
    }
}

/// Prints the catalog of the domain it is bound to
#[derive(Default)]
struct CatalogService {
    binding: DomainService,
}

impl CatalogService {
    fn print(&self, store: &Store, heading: &str) -> anyhow::Result<()> {
        let Some(domain) = self.binding.domain() else {
            anyhow::bail!("catalog is not bound to a domain");
        };
        let graph = store.domain_graph(domain.name())?;
        let session = store.begin_session(SessionConfiguration::new().read_only());

        println!("\n{} ({})", heading, store.get_domain(domain.name())?.extension_name());
        for element in graph.get_entities(&session, Some(&id("Book")), 0, false) {
            let element = element?;
            let title = graph.get_property_value(&session, element.id(), element.schema_id(), "Title")?;
            println!("  {} {}", element.id(), title.value);
        }
        session.abort();
        Ok(())
    }
}

fn seed() -> Arc<InMemoryAdapter> {
    let adapter = InMemoryAdapter::new();
    adapter.insert_entity(id("main"), id("Library"));
    adapter.set_property(&id("main"), "Name", "Main branch".into(), 1);
    for (n, title) in ["Dune", "Solaris", "Neuromancer", "Hyperion"].iter().enumerate() {
        let book = id(&format!("book{}", n + 1));
        adapter.insert_entity(book.clone(), id("Book"));
        adapter.set_property(&book, "Title", Value::from(*title), 1);
        adapter.insert_relationship(
            id(&format!("main-book{}", n + 1)),
            id("LibraryHasBooks"),
            (id("main"), id("Library")),
            (book, id("Book")),
        );
    }
    Arc::new(adapter)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Hyperstore v{}", hyperstore::version());
    println!("==========================================");

    let store = Store::new(StoreConfig::default())?;
    store.register_constraint(Arc::new(TitleRequired));

    let adapter = seed();
    let library = store.load_domain_with_adapter(DOMAIN, adapter.clone())?;
    library.register_schema(SchemaElement::entity(id("Library")).with_property("Name", ValueKind::String))?;
    library.register_schema(SchemaElement::entity(id("Book")).with_property("Title", ValueKind::String))?;
    library.register_schema(SchemaElement::relationship(id("LibraryHasBooks"), id("Library"), id("Book")).embedded())?;

    let catalog = CatalogService::default();
    catalog.binding.set_domain(library.clone());
    catalog.print(&store, "Catalog")?;

    // A book without a title is rejected at commit
    let graph = library.graph();
    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("untitled"), &id("Book"))?;
    let result = session.commit();
    for message in result.errors() {
        println!("\nRejected: {}", message);
    }

    let session = store.begin_session(SessionConfiguration::new());
    graph.create_entity(&session, id("book5"), &id("Book"))?;
    graph.set_property_value(&session, &id("book5"), &id("Book"), "Title", "Foundation".into(), None)?;
    graph.create_relationship(
        &session,
        id("main-book5"),
        &id("LibraryHasBooks"),
        &id("main"),
        &id("Library"),
        &id("book5"),
        &id("Book"),
    )?;
    let result = session.commit();
    info!("Committed {} element(s), adapter received {} change set(s)", result.involved.len(), adapter.persisted_count());

    // Work in an extension; the base is untouched once it is unloaded
    let extension = store.create_extension(DOMAIN, ExtendedMode::ReadOnly)?;
    let overlay = extension.graph();
    let session = store.begin_session(SessionConfiguration::new());
    overlay.set_property_value(&session, &id("book1"), &id("Book"), "Title", "Dune Messiah".into(), None)?;
    overlay.remove_entity(&session, &id("book2"), &id("Book"), true)?;
    session.commit();
    catalog.print(&store, "Catalog with extension")?;

    store.unload_extension(&extension)?;
    catalog.print(&store, "Catalog after unloading the extension")?;

    let stats = library.statistics().snapshot();
    println!(
        "\n{} entities, {} relationships tracked in {}",
        stats.entity_count(),
        stats.relationship_count(),
        library.name()
    );
    Ok(())
}
