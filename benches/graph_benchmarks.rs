use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hyperstore::{
    DomainModel, ExtendedMode, GraphProvider, Identity, IndexDefinition, SchemaElement, SessionConfiguration,
    SessionIsolationLevel, Store, Value, ValueKind,
};
use std::sync::Arc;

fn id(key: &str) -> Identity {
    Identity::new("bench", key)
}

fn domain(store: &Store) -> Arc<DomainModel> {
    let domain = store.load_domain("bench").unwrap();
    domain
        .register_schema(
            SchemaElement::entity(id("Person"))
                .with_property("Name", ValueKind::String)
                .with_property("Age", ValueKind::Integer),
        )
        .unwrap();
    domain
        .register_schema(SchemaElement::relationship(id("Knows"), id("Person"), id("Person")))
        .unwrap();
    domain
}

/// Chain of `size` people, each knowing the next
fn populate(store: &Store, domain: &DomainModel, size: usize) {
    let graph = domain.graph();
    let session = store.begin_session(SessionConfiguration::new());
    for i in 0..size {
        let person = id(&format!("p{}", i));
        graph.create_entity(&session, person.clone(), &id("Person")).unwrap();
        graph
            .set_property_value(&session, &person, &id("Person"), "Name", format!("Person{}", i).into(), None)
            .unwrap();
        graph
            .set_property_value(&session, &person, &id("Person"), "Age", Value::Integer((i % 100) as i64), None)
            .unwrap();
        if i > 0 {
            graph
                .create_relationship(
                    &session,
                    id(&format!("k{}", i)),
                    &id("Knows"),
                    &id(&format!("p{}", i - 1)),
                    &id("Person"),
                    &person,
                    &id("Person"),
                )
                .unwrap();
        }
    }
    session.commit();
}

/// Benchmark entity insertion throughput
fn bench_entity_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_insertion");

    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let store = Store::default();
                let domain = domain(&store);
                populate(&store, &domain, size);
            });
        });
    }
    group.finish();
}

/// Benchmark schema-filtered enumeration
fn bench_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumeration");

    for size in [100, 1000, 10_000].iter() {
        let store = Store::default();
        let domain = domain(&store);
        populate(&store, &domain, *size);
        let graph = domain.graph();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let session =
                    store.begin_session(SessionConfiguration::new().with_isolation(SessionIsolationLevel::ReadCommitted));
                let count = graph.get_entities(&session, Some(&id("Person")), 0, false).count();
                criterion::black_box(count);
            });
        });
    }
    group.finish();
}

/// Benchmark multi-hop traversal along outgoing edges
fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("traversal");

    let store = Store::default();
    let domain = domain(&store);
    populate(&store, &domain, 1000);
    let graph = domain.graph();

    for hops in [1, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(hops), hops, |b, &hops| {
            b.iter(|| {
                let session = store.begin_session(SessionConfiguration::new());
                let mut current = id("p0");
                for _ in 0..hops {
                    let edges = graph
                        .get_edges(&session, &current, hyperstore::Direction::Outgoing, None)
                        .unwrap();
                    match edges.first() {
                        Some(edge) => current = edge.end_id.clone(),
                        None => break,
                    }
                }
                criterion::black_box(current);
            });
        });
    }
    group.finish();
}

/// Benchmark commit cost with a maintained index
fn bench_indexed_commit(c: &mut Criterion) {
    let store = Store::default();
    let domain = domain(&store);
    domain
        .create_index(IndexDefinition::new("person_age", id("Person"), "Age", false))
        .unwrap();
    populate(&store, &domain, 1000);
    let graph = domain.graph();

    let mut age = 0i64;
    c.bench_function("indexed_commit", |b| {
        b.iter(|| {
            age += 1;
            let session = store.begin_session(SessionConfiguration::new());
            graph
                .set_property_value(&session, &id("p500"), &id("Person"), "Age", Value::Integer(age), None)
                .unwrap();
            session.commit()
        });
    });
}

/// Benchmark reads resolved through an extension
fn bench_extension_reads(c: &mut Criterion) {
    let store = Store::default();
    let domain = domain(&store);
    populate(&store, &domain, 1000);
    let extension = store.create_extension("bench", ExtendedMode::ReadOnly).unwrap();
    let overlay = extension.graph();

    c.bench_function("extension_property_read", |b| {
        b.iter(|| {
            let session = store.begin_session(SessionConfiguration::new());
            let value = overlay
                .get_property_value(&session, &id("p42"), &id("Person"), "Name")
                .unwrap();
            criterion::black_box(value);
        });
    });
}

criterion_group!(
    benches,
    bench_entity_insertion,
    bench_enumeration,
    bench_traversal,
    bench_indexed_commit,
    bench_extension_reads
);
criterion_main!(benches);
