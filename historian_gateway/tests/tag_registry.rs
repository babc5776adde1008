use historian_gateway::error::GatewayError;
use historian_gateway::tags::registry::TagRegistry;
use historian_gateway::tags::structures::{FieldType, TagDefinition};
use std::sync::Arc;
use std::thread;

fn sample_tag(name: &str, address: &str) -> TagDefinition {
    TagDefinition::new(name, address, FieldType::Real, 1)
}

#[test]
fn add_and_resolve_tag() {
    let registry = TagRegistry::new();
    let tag = sample_tag("Line1/Temperature", "DB1.DBD0");
    registry.add(tag.clone());

    let resolved = registry.resolve("Line1/Temperature").expect("tag should exist");
    assert_eq!(resolved, tag);
    assert!(registry.contains("Line1/Temperature"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn resolve_unknown_tag_fails() {
    let registry = TagRegistry::new();
    assert_eq!(
        registry.resolve("missing"),
        Err(GatewayError::TagNotFound("missing".to_string()))
    );
}

#[test]
fn add_replaces_existing_definition() {
    let registry = TagRegistry::new();
    registry.add(sample_tag("Pump/Speed", "DB1.DBD0"));
    registry.add(sample_tag("Pump/Speed", "DB2.DBD8"));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.resolve("Pump/Speed").unwrap().address, "DB2.DBD8");
}

#[test]
fn remove_reports_whether_tag_existed() {
    let registry = TagRegistry::new();
    registry.add(sample_tag("A", "DB1.DBD0"));

    assert!(registry.remove("A"));
    assert!(!registry.remove("A"));
    assert!(registry.is_empty());
    assert!(registry.resolve("A").is_err());
}

#[test]
fn names_are_sorted() {
    let registry = TagRegistry::new();
    for name in ["c", "a", "b"] {
        registry.add(sample_tag(name, "DB1.DBD0"));
    }
    assert_eq!(registry.names(), vec!["a", "b", "c"]);
}

#[test]
fn concurrent_adds_from_many_threads() {
    let registry = Arc::new(TagRegistry::new());
    let threads = 8;
    let per_thread = 250;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..per_thread {
                    let name = format!("T{}/Tag{:04}", t, i);
                    registry.add(sample_tag(&name, "DB1.DBD0"));
                    assert!(registry.contains(&name));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }
    assert_eq!(registry.len(), threads * per_thread);
}

#[test]
fn clones_share_the_same_map() {
    let registry = TagRegistry::new();
    let other = registry.clone();
    registry.add(sample_tag("shared", "DB1.DBD0"));
    assert!(other.contains("shared"));
}
