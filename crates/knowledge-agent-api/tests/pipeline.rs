mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use knowledge_agent_api::document::{ChunkOptions, ContentExtractor};
use knowledge_agent_api::services::indexer::{IndexerOptions, IndexingPipeline, RunOutcome};

use common::{page_document, FakeEmbedder, FakeProvider, InMemoryIndex};

fn default_options() -> IndexerOptions {
    IndexerOptions {
        site_url: None,
        days_back: 30,
        skip_embeddings: false,
        limit: None,
    }
}

struct Harness {
    provider: Arc<FakeProvider>,
    embedder: Arc<FakeEmbedder>,
    index: Arc<InMemoryIndex>,
    pipeline: Arc<IndexingPipeline>,
}

fn harness(provider: FakeProvider) -> Harness {
    let provider = Arc::new(provider);
    let embedder = Arc::new(FakeEmbedder::default());
    let index = Arc::new(InMemoryIndex::default());
    let extractor = ContentExtractor::new(provider.clone());
    let pipeline = Arc::new(IndexingPipeline::new(
        provider.clone(),
        extractor,
        embedder.clone(),
        index.clone(),
        ChunkOptions::default(),
    ));
    Harness {
        provider,
        embedder,
        index,
        pipeline,
    }
}

fn long_content() -> String {
    let mut text = "alpha beta gamma ".repeat(265);
    text.truncate(4500);
    text
}

#[tokio::test]
async fn single_document_fresh_index() {
    let provider = FakeProvider::with_documents(vec![page_document("doc-1")]);
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    let outcome = h.pipeline.run(default_options()).await.unwrap();
    let RunOutcome::Completed(result) = outcome else {
        panic!("expected a completed pass");
    };

    assert_eq!(result.documents_found, 1);
    assert_eq!(result.documents_processed, 1);
    assert_eq!(result.chunks_created, 3);
    assert!(result.errors.is_empty());

    // one embed call covering all three chunk texts
    assert_eq!(h.embedder.batches(), vec![3]);

    let stored = h.index.chunks_for("doc-1");
    assert_eq!(stored.len(), 3);
    for (i, chunk) in stored.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i32);
        assert_eq!(chunk.id, format!("doc-1_chunk_{i}"));
        assert_eq!(chunk.document_id, "doc-1");
        assert_eq!(chunk.site_name, "kb");
        assert_eq!(chunk.embedding.len(), 1536);
    }
}

#[tokio::test]
async fn replace_semantics_drop_prior_chunks() {
    let provider = FakeProvider::with_documents(vec![page_document("doc-1")]);
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    let first = h.pipeline.run(default_options()).await.unwrap();
    let RunOutcome::Completed(first) = first else {
        panic!("first pass should complete");
    };
    assert_eq!(first.chunks_created, 3);
    let pass_one = h.index.chunks_for("doc-1");

    // shrink the document between passes
    let mut shorter = "delta epsilon zeta ".repeat(120);
    shorter.truncate(2200);
    h.provider.set_content("doc-1.aspx", &shorter);

    let second = h.pipeline.run(default_options()).await.unwrap();
    let RunOutcome::Completed(second) = second else {
        panic!("second pass should complete");
    };

    let pass_two = h.index.chunks_for("doc-1");
    assert_eq!(pass_two.len(), second.chunks_created);
    assert!(pass_two.len() < pass_one.len(), "stale chunks must be gone");
    assert_eq!(h.index.chunk_count_for("doc-1"), pass_two.len());

    for chunk in &pass_two {
        assert!(chunk.chunk_text.contains("delta"));
        let pass_one_max = pass_one.iter().map(|c| c.indexed_at).max().unwrap();
        assert!(chunk.indexed_at >= pass_one_max);
    }
}

#[tokio::test]
async fn back_to_back_passes_are_idempotent() {
    let provider = FakeProvider::with_documents(vec![page_document("doc-1")]);
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    h.pipeline.run(default_options()).await.unwrap();
    let first: Vec<(String, String)> = h
        .index
        .chunks_for("doc-1")
        .into_iter()
        .map(|c| (c.id, c.chunk_text))
        .collect();

    h.pipeline.run(default_options()).await.unwrap();
    let second: Vec<(String, String)> = h
        .index
        .chunks_for("doc-1")
        .into_iter()
        .map(|c| (c.id, c.chunk_text))
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn extraction_failure_is_isolated_per_document() {
    let provider = FakeProvider::with_documents(vec![
        page_document("broken-doc"),
        page_document("healthy-doc"),
    ]);
    provider.fail_page("broken-doc.aspx");
    provider.set_content("healthy-doc.aspx", &long_content());
    let h = harness(provider);

    let RunOutcome::Completed(result) = h.pipeline.run(default_options()).await.unwrap() else {
        panic!("pass should complete despite the broken document");
    };

    assert_eq!(result.documents_found, 2);
    assert_eq!(result.documents_processed, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(
        result.errors[0].contains("broken-doc.aspx"),
        "error should name the failing document: {}",
        result.errors[0]
    );

    assert_eq!(h.index.chunk_count_for("healthy-doc"), 3);
    assert_eq!(h.index.chunk_count_for("broken-doc"), 0);
}

#[tokio::test]
async fn thin_documents_are_skipped_not_errored() {
    let provider = FakeProvider::with_documents(vec![page_document("tiny")]);
    provider.set_content("tiny.aspx", "too short to index");
    let h = harness(provider);

    let RunOutcome::Completed(result) = h.pipeline.run(default_options()).await.unwrap() else {
        panic!("pass should complete");
    };

    assert_eq!(result.documents_found, 1);
    assert_eq!(result.documents_processed, 0);
    assert_eq!(result.documents_skipped, 1);
    assert!(result.errors.is_empty());
    assert_eq!(h.index.chunk_count_for("tiny"), 0);
}

#[tokio::test]
async fn test_mode_counts_without_storing() {
    let provider = FakeProvider::with_documents(vec![page_document("doc-1")]);
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    let options = IndexerOptions {
        skip_embeddings: true,
        ..default_options()
    };
    let RunOutcome::Completed(result) = h.pipeline.run(options).await.unwrap() else {
        panic!("pass should complete");
    };

    assert_eq!(result.documents_processed, 1);
    assert_eq!(result.chunks_created, 3);
    assert!(h.embedder.batches().is_empty(), "no embeddings in test mode");
    assert_eq!(h.index.chunk_count_for("doc-1"), 0, "nothing stored");
}

#[tokio::test]
async fn overlapping_trigger_is_dropped() {
    let provider = FakeProvider {
        search_delay: Some(Duration::from_millis(200)),
        ..FakeProvider::default()
    };
    provider
        .documents
        .lock()
        .unwrap()
        .push(page_document("doc-1"));
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    let pipeline = h.pipeline.clone();
    let run_a = tokio::spawn(async move { pipeline.run(default_options()).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let run_b = h.pipeline.run(default_options()).await.unwrap();
    assert!(
        matches!(run_b, RunOutcome::AlreadyRunning),
        "second trigger must be dropped while the first is in flight"
    );

    let run_a = run_a.await.unwrap().unwrap();
    let RunOutcome::Completed(result) = run_a else {
        panic!("first pass should complete");
    };
    assert_eq!(result.documents_processed, 1);
    assert_eq!(h.index.chunk_count_for("doc-1"), 3);

    // the guard resets: a later trigger runs again
    let rerun = h.pipeline.run(default_options()).await.unwrap();
    assert!(matches!(rerun, RunOutcome::Completed(_)));
}

#[tokio::test]
async fn preview_lists_candidates_without_indexing() {
    let provider = FakeProvider::with_documents(vec![
        page_document("a"),
        page_document("b"),
        page_document("c"),
    ]);
    let h = harness(provider);

    let options = IndexerOptions {
        limit: Some(2),
        ..default_options()
    };
    let preview = h.pipeline.preview(&options).await.unwrap();
    assert_eq!(preview.len(), 2);
    assert_eq!(h.index.chunks.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn document_errors_name_every_failure() {
    let provider = FakeProvider::with_documents(vec![
        page_document("x"),
        page_document("y"),
    ]);
    provider.fail_page("x.aspx");
    provider.fail_page("y.aspx");
    let h = harness(provider);

    let RunOutcome::Completed(result) = h.pipeline.run(default_options()).await.unwrap() else {
        panic!("pass should complete");
    };
    assert_eq!(result.errors.len(), 2);
    let joined = result.errors.join("\n");
    let unique: HashSet<&String> = result.errors.iter().collect();
    assert_eq!(unique.len(), 2);
    assert!(joined.contains("x.aspx") && joined.contains("y.aspx"));
}

#[tokio::test]
async fn concurrent_triggers_leave_consistent_state() {
    let provider = FakeProvider {
        search_delay: Some(Duration::from_millis(50)),
        ..FakeProvider::default()
    };
    provider
        .documents
        .lock()
        .unwrap()
        .push(page_document("doc-1"));
    provider.set_content("doc-1.aspx", &long_content());
    let h = harness(provider);

    let results = Arc::new(Mutex::new(Vec::new()));
    let mut joins = Vec::new();
    for _ in 0..4 {
        let pipeline = h.pipeline.clone();
        let results = results.clone();
        joins.push(tokio::spawn(async move {
            let outcome = pipeline.run(default_options()).await.unwrap();
            results.lock().unwrap().push(outcome);
        }));
    }
    for join in joins {
        join.await.unwrap();
    }

    let results = results.lock().unwrap();
    let completed = results
        .iter()
        .filter(|o| matches!(o, RunOutcome::Completed(_)))
        .count();
    assert!(completed >= 1);
    assert_eq!(h.index.chunk_count_for("doc-1"), 3);
}
