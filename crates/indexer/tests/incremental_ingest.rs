use async_trait::async_trait;
use knowledge_indexer::{
    DedupKey, DirectorySource, IncrementalIndexer, IndexerError, IndexerOptions, TextDocument,
};
use knowledge_text_chunker::ChunkerConfig;
use knowledge_vector_store::{
    manifest_path, Embedder, KnowledgeStore, StubEmbedder, VectorStoreError,
};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Maps known passages to hand-picked vectors so distances are predictable
struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    fn new(pairs: &[(&str, &[f32])]) -> Self {
        Self {
            vectors: pairs
                .iter()
                .map(|(text, v)| ((*text).to_string(), v.to_vec()))
                .collect(),
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn model_id(&self) -> &str {
        "fixed-2"
    }

    async fn embed_batch(&self, texts: &[String]) -> knowledge_vector_store::Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                self.vectors.get(text).cloned().ok_or_else(|| {
                    VectorStoreError::EmbeddingError(format!("no vector for {text:?}"))
                })
            })
            .collect()
    }
}

fn stub() -> Arc<dyn Embedder> {
    Arc::new(StubEmbedder::new(16).unwrap())
}

fn indexer(dir: &TempDir, embedder: Arc<dyn Embedder>, dedup: DedupKey) -> IncrementalIndexer {
    let options = IndexerOptions {
        chunker: ChunkerConfig::new(60, 10),
        dedup,
    };
    IncrementalIndexer::new(dir.path().join("store"), embedder, options).unwrap()
}

fn docs(pairs: &[(&str, &str)]) -> Vec<TextDocument> {
    pairs
        .iter()
        .map(|(id, text)| TextDocument::new(*id, *text))
        .collect()
}

#[tokio::test]
async fn fixed_vectors_rank_nearest_sources_first() {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    std::fs::create_dir(&uploads).unwrap();
    std::fs::write(uploads.join("doc1.txt"), "alpha").unwrap();
    std::fs::write(uploads.join("doc2.txt"), "beta").unwrap();
    std::fs::write(uploads.join("doc3.txt"), "gamma").unwrap();

    let embedder = Arc::new(FixedEmbedder::new(&[
        ("alpha", &[0.0, 0.0]),
        ("beta", &[1.0, 0.0]),
        ("gamma", &[10.0, 10.0]),
    ]));
    let indexer = indexer(&tmp, embedder, DedupKey::Identifier);

    let documents = DirectorySource::new(&uploads).scan().unwrap();
    let stats = indexer.run(&documents).await.unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.total_records, 3);
    assert!(stats.persisted);

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    let hits = store.search(&[0.1, 0.0], 2).unwrap();
    let sources: Vec<&str> = hits.iter().map(|h| h.record.source()).collect();
    assert_eq!(sources, vec!["doc1.txt", "doc2.txt"]);
    assert!((hits[0].distance - 0.01).abs() < 1e-6);
    assert!((hits[1].distance - 0.81).abs() < 1e-6);

    // Re-uploading doc1.txt with different content changes nothing under identifier dedup.
    std::fs::write(uploads.join("doc1.txt"), "alpha revised").unwrap();
    let documents = DirectorySource::new(&uploads).scan().unwrap();
    let again = indexer.run(&documents).await.unwrap();
    assert_eq!(again.skipped, 3);
    assert_eq!(again.processed, 0);
    assert!(!again.persisted);
    assert_eq!(again.total_records, 3);
}

#[tokio::test]
async fn second_run_over_same_sources_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);
    let sources = docs(&[
        ("policy.txt", "Vacation requests go through the HR portal."),
        ("travel.md", "Book travel through the approved agency."),
    ]);

    let first = indexer.run(&sources).await.unwrap();
    assert_eq!(first.processed, 2);
    let generation = KnowledgeStore::load(indexer.store_dir())
        .await
        .unwrap()
        .generation();

    let second = indexer.run(&sources).await.unwrap();
    assert_eq!(second.processed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.total_records, first.total_records);

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    assert_eq!(store.generation(), generation);
}

#[tokio::test]
async fn ingestion_order_does_not_change_record_sets() {
    let a = ("a.txt", "Expenses are reimbursed monthly once receipts are uploaded.");
    let b = ("b.txt", "Managers approve vacation within three business days.");

    let forward = TempDir::new().unwrap();
    let fwd = indexer(&forward, stub(), DedupKey::Identifier);
    fwd.run(&docs(&[a])).await.unwrap();
    fwd.run(&docs(&[b])).await.unwrap();

    let backward = TempDir::new().unwrap();
    let bwd = indexer(&backward, stub(), DedupKey::Identifier);
    bwd.run(&docs(&[b])).await.unwrap();
    bwd.run(&docs(&[a])).await.unwrap();

    let left = KnowledgeStore::load(fwd.store_dir()).await.unwrap();
    let right = KnowledgeStore::load(bwd.store_dir()).await.unwrap();
    let mut left_texts: Vec<(String, String)> = left
        .metadata()
        .all()
        .iter()
        .map(|r| (r.source().to_string(), r.text().to_string()))
        .collect();
    let mut right_texts: Vec<(String, String)> = right
        .metadata()
        .all()
        .iter()
        .map(|r| (r.source().to_string(), r.text().to_string()))
        .collect();
    left_texts.sort();
    right_texts.sort();
    assert_eq!(left_texts, right_texts);
}

#[tokio::test]
async fn failing_sources_are_skipped_and_the_rest_commit() {
    let tmp = TempDir::new().unwrap();
    let uploads = tmp.path().join("uploads");
    std::fs::create_dir(&uploads).unwrap();
    std::fs::write(uploads.join("notes.txt"), "Keep every receipt.").unwrap();
    std::fs::write(uploads.join("scan.pdf"), b"%PDF-1.4 binary").unwrap();

    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);
    let documents = DirectorySource::new(&uploads).scan().unwrap();
    let stats = indexer.run(&documents).await.unwrap();

    assert_eq!(stats.discovered, 2);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].source_id, "scan.pdf");

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    assert_eq!(store.processed_sources().into_iter().collect::<Vec<_>>(), vec!["notes.txt"]);
}

#[tokio::test]
async fn source_with_wrong_dimension_is_rejected_alone() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(FixedEmbedder::new(&[
        ("two dims", &[1.0, 2.0]),
        ("three dims", &[1.0, 2.0, 3.0]),
    ]));
    let indexer = indexer(&tmp, embedder, DedupKey::Identifier);

    let stats = indexer
        .run(&docs(&[("first", "two dims"), ("second", "three dims")]))
        .await
        .unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failures.len(), 1);
    assert_eq!(stats.failures[0].source_id, "second");

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    assert_eq!(store.dimension(), Some(2));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn empty_documents_count_as_processed_without_records() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);
    let stats = indexer
        .run(&docs(&[("blank.txt", "   \n\n  "), ("real.txt", "Some words.")]))
        .await
        .unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.chunks_added, 1);
    assert!(stats.failures.is_empty());
}

#[tokio::test]
async fn repeated_ids_within_a_run_keep_the_first() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);
    let stats = indexer
        .run(&docs(&[("dup.txt", "first version"), ("dup.txt", "second version")]))
        .await
        .unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.skipped, 1);

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    assert_eq!(store.metadata().all()[0].text(), "first version");
}

#[tokio::test]
async fn content_hash_dedup_skips_renamed_copies() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::ContentHash);

    indexer
        .run(&docs(&[("original.txt", "Same words in both files.")]))
        .await
        .unwrap();
    let stats = indexer
        .run(&docs(&[
            ("copy.txt", "Same words in both files."),
            ("original.txt", "Edited words now."),
        ]))
        .await
        .unwrap();

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.total_records, 2);
}

#[tokio::test]
async fn both_key_appends_changed_content_under_known_id() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Both);

    indexer
        .run(&docs(&[("faq.txt", "Old answer.")]))
        .await
        .unwrap();
    let unchanged = indexer
        .run(&docs(&[("faq.txt", "Old answer.")]))
        .await
        .unwrap();
    assert_eq!(unchanged.skipped, 1);

    let changed = indexer
        .run(&docs(&[("faq.txt", "New answer.")]))
        .await
        .unwrap();
    assert_eq!(changed.processed, 1);

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    let texts: Vec<&str> = store.metadata().all().iter().map(|r| r.text()).collect();
    assert_eq!(texts, vec!["Old answer.", "New answer."]);
}

#[tokio::test]
async fn rebuild_replaces_previous_state() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);

    indexer
        .run(&docs(&[("old.txt", "Retired policy."), ("kept.txt", "Current policy.")]))
        .await
        .unwrap();
    let stats = indexer
        .rebuild(&docs(&[("kept.txt", "Current policy.")]))
        .await
        .unwrap();

    assert!(stats.rebuilt);
    assert!(stats.persisted);
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.total_records, 1);

    let store = KnowledgeStore::load(indexer.store_dir()).await.unwrap();
    assert_eq!(
        store.processed_sources().into_iter().collect::<Vec<_>>(),
        vec!["kept.txt"]
    );
}

#[tokio::test]
async fn corrupt_store_stops_the_run() {
    let tmp = TempDir::new().unwrap();
    let indexer = indexer(&tmp, stub(), DedupKey::Identifier);
    indexer
        .run(&docs(&[("a.txt", "Some text.")]))
        .await
        .unwrap();

    std::fs::write(manifest_path(indexer.store_dir()), b"{ not json").unwrap();

    let err = indexer
        .run(&docs(&[("b.txt", "More text.")]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IndexerError::VectorStoreError(VectorStoreError::CorruptPersistedState(_))
    ));
}

#[test]
fn invalid_chunking_is_rejected_up_front() {
    let tmp = TempDir::new().unwrap();
    let options = IndexerOptions {
        chunker: ChunkerConfig::new(10, 10),
        dedup: DedupKey::Identifier,
    };
    let err = IncrementalIndexer::new(tmp.path(), stub(), options)
        .err()
        .unwrap();
    assert!(matches!(err, IndexerError::ChunkerError(_)));
}
