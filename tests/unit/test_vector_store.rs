use serde_json::json;
use signalbox::core::vector_store::{VectorRecord, VectorStore};
use signalbox_types::Namespace;

fn record(namespace: Namespace, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> VectorRecord {
    VectorRecord {
        id: id.to_string(),
        namespace,
        vector,
        payload: payload.as_object().cloned().unwrap_or_default(),
    }
}

#[test]
fn search_ranks_by_cosine_descending() {
    let store = VectorStore::in_memory();
    store
        .upsert(vec![
            record(Namespace::Workflows, "close", vec![0.9, 0.1], json!({})),
            record(Namespace::Workflows, "closer", vec![1.0, 0.0], json!({})),
            record(Namespace::Workflows, "far", vec![0.0, 1.0], json!({})),
        ])
        .unwrap();
    let hits = store.search(Namespace::Workflows, &[1.0, 0.0], 10, 0.5, None);
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["closer", "close"]);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn top_k_truncates_after_ranking() {
    let store = VectorStore::in_memory();
    let records = (0..20)
        .map(|i| {
            record(
                Namespace::Tools,
                &format!("t{}", i),
                vec![1.0, i as f32 / 100.0],
                json!({}),
            )
        })
        .collect();
    store.upsert(records).unwrap();
    let hits = store.search(Namespace::Tools, &[1.0, 0.0], 5, 0.0, None);
    assert_eq!(hits.len(), 5);
}

// P8 at the store level: the metadata filter is respected even for
// identical vectors.
#[test]
fn metadata_filter_blocks_other_workflows() {
    let store = VectorStore::in_memory();
    let vector = vec![0.6, 0.8];
    store
        .upsert(vec![
            record(
                Namespace::Parameters,
                "a",
                vector.clone(),
                json!({"workflow_name": "picnic_table_workflow", "parameter_name": "leg_angle_left"}),
            ),
            record(
                Namespace::Parameters,
                "b",
                vector.clone(),
                json!({"workflow_name": "chair_workflow", "parameter_name": "leg_angle_left"}),
            ),
        ])
        .unwrap();

    let filter = json!({
        "workflow_name": "picnic_table_workflow",
        "parameter_name": "leg_angle_left"
    });
    let hits = store.search(Namespace::Parameters, &vector, 10, 0.85, filter.as_object());
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
}

#[test]
fn threshold_excludes_weak_matches() {
    let store = VectorStore::in_memory();
    store
        .upsert(vec![record(
            Namespace::Parameters,
            "weak",
            vec![0.5, 0.866],
            json!({}),
        )])
        .unwrap();
    // cos(60°) = 0.5, below a 0.85 threshold.
    assert!(store
        .search(Namespace::Parameters, &[1.0, 0.0], 10, 0.85, None)
        .is_empty());
}

#[test]
fn persistence_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = VectorStore::open(dir.path()).unwrap();
        store
            .upsert(vec![
                record(Namespace::Parameters, "keep", vec![1.0, 0.0], json!({"value": 0.32})),
                record(Namespace::Parameters, "drop", vec![0.0, 1.0], json!({})),
            ])
            .unwrap();
        store.delete(Namespace::Parameters, "drop").unwrap();
    }

    let store = VectorStore::open(dir.path()).unwrap();
    assert_eq!(store.stats().records["parameters"], 1);
    let hits = store.search(Namespace::Parameters, &[1.0, 0.0], 1, 0.9, None);
    assert_eq!(hits[0].payload["value"], json!(0.32));
}

#[test]
fn in_memory_fallback_has_identical_semantics() {
    // Point the store at an unwritable path; it must degrade to memory
    // and keep serving.
    let store = VectorStore::open_or_memory(std::path::Path::new("/proc/definitely/not/writable"));
    assert!(!store.is_persistent());
    store
        .upsert(vec![record(Namespace::Tools, "t", vec![1.0], json!({}))])
        .unwrap();
    assert_eq!(store.search(Namespace::Tools, &[1.0], 1, 0.5, None).len(), 1);
}

#[test]
fn clear_empties_one_namespace_only() {
    let store = VectorStore::in_memory();
    store
        .upsert(vec![
            record(Namespace::Tools, "t", vec![1.0], json!({})),
            record(Namespace::Workflows, "w", vec![1.0], json!({})),
        ])
        .unwrap();
    store.clear(Namespace::Tools).unwrap();
    let stats = store.stats();
    assert_eq!(stats.records["tools"], 0);
    assert_eq!(stats.records["workflows"], 1);
}
