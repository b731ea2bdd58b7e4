use std::collections::HashSet;

use quarry::error::{QuarryError, Result};
use quarry::{
    ChunkCreate, ChunkUpdate, DocumentCreate, Engine, EngineConfig, IndexConfig, IndexKind,
    LibraryCreate, LibraryUpdate, LshOption, QueryRequest,
};
use uuid::Uuid;

const DIM: usize = 4;

fn engine(kind: IndexKind) -> Result<Engine> {
    let config = EngineConfig::builder()
        .dimension(DIM)
        .default_index_type(kind)
        .index(IndexConfig::default().lsh(LshOption::new().seed(42)))
        .build();
    Engine::in_memory(config)
}

fn indexed_ids(engine: &Engine, library_id: &Uuid) -> Result<HashSet<Uuid>> {
    let index = engine.coordinator().resolve(library_id)?;
    let ids = index.read().ids();
    Ok(ids.into_iter().collect())
}

fn stored_chunk_ids(engine: &Engine, library_id: &Uuid) -> Result<HashSet<Uuid>> {
    let mut ids = HashSet::new();
    for document in engine.list_documents(library_id)? {
        for chunk in engine.list_chunks(&document.id)? {
            ids.insert(chunk.id);
        }
    }
    Ok(ids)
}

#[test]
fn test_index_tracks_chunk_mutations() -> Result<()> {
    for kind in [IndexKind::Lsh, IndexKind::BruteForce] {
        let engine = engine(kind)?;
        let library = engine.create_library(LibraryCreate::new("lib"))?;
        let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;

        let mut chunks = Vec::new();
        for i in 0..6 {
            let v = vec![1.0, i as f32, 0.5, -(i as f32)];
            chunks.push(engine.create_chunk(&doc.id, ChunkCreate::new(format!("c{i}")).embedding(v))?);
        }
        assert_eq!(indexed_ids(&engine, &library.id)?, stored_chunk_ids(&engine, &library.id)?);

        engine.delete_chunk(&chunks[0].id)?;
        engine.update_chunk(
            &chunks[1].id,
            ChunkUpdate::default().embedding(vec![-1.0, 0.0, 0.0, 0.0]),
        )?;
        assert_eq!(indexed_ids(&engine, &library.id)?, stored_chunk_ids(&engine, &library.id)?);

        let results = engine.query(
            &library.id,
            QueryRequest::from_embedding(vec![-1.0, 0.0, 0.0, 0.0]).k(3),
        )?;
        assert_eq!(results[0].chunk_id, chunks[1].id);
        assert!(results.iter().all(|r| r.chunk_id != chunks[0].id));
    }
    Ok(())
}

#[test]
fn test_empty_library_query_is_empty() -> Result<()> {
    for kind in [IndexKind::Lsh, IndexKind::BruteForce] {
        let engine = engine(kind)?;
        let library = engine.create_library(LibraryCreate::new("empty"))?;
        let results = engine.query(
            &library.id,
            QueryRequest::from_embedding(vec![0.1, 0.2, 0.3, 0.4]),
        )?;
        assert!(results.is_empty());
    }
    Ok(())
}

#[test]
fn test_wrong_dimension_leaves_state_untouched() -> Result<()> {
    let engine = engine(IndexKind::Lsh)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    let kept = engine.create_chunk(&doc.id, ChunkCreate::new("ok").embedding(vec![1.0; DIM]))?;

    let err = engine
        .create_chunk(&doc.id, ChunkCreate::new("short").embedding(vec![1.0; DIM - 1]))
        .unwrap_err();
    assert!(matches!(
        err,
        QuarryError::DimensionMismatch {
            expected: DIM,
            actual: 3
        }
    ));

    let err = engine
        .update_chunk(&kept.id, ChunkUpdate::default().embedding(vec![0.0; DIM + 1]))
        .unwrap_err();
    assert!(matches!(err, QuarryError::DimensionMismatch { .. }));

    assert_eq!(engine.list_chunks(&doc.id)?.len(), 1);
    assert_eq!(engine.get_chunk(&kept.id)?.embedding, vec![1.0; DIM]);
    assert_eq!(indexed_ids(&engine, &library.id)?, HashSet::from([kept.id]));

    assert!(
        engine
            .query(&library.id, QueryRequest::from_embedding(vec![1.0; DIM - 1]))
            .is_err()
    );
    Ok(())
}

#[test]
fn test_delete_library_cascades() -> Result<()> {
    let engine = engine(IndexKind::Lsh)?;
    let library = engine.create_library(LibraryCreate::new("doomed"))?;
    let survivor = engine.create_library(LibraryCreate::new("survivor"))?;

    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    let chunk = engine.create_chunk(&doc.id, ChunkCreate::new("x").embedding(vec![1.0; DIM]))?;
    let other_doc = engine.create_document(&survivor.id, DocumentCreate::new("doc"))?;
    let other = engine.create_chunk(
        &other_doc.id,
        ChunkCreate::new("y").embedding(vec![1.0; DIM]),
    )?;

    engine.delete_library(&library.id)?;

    assert!(matches!(engine.get_library(&library.id), Err(QuarryError::NotFound(_))));
    assert!(matches!(engine.get_document(&doc.id), Err(QuarryError::NotFound(_))));
    assert!(matches!(engine.get_chunk(&chunk.id), Err(QuarryError::NotFound(_))));
    assert!(!engine.coordinator().repository().is_persisted(&library.id));
    assert!(matches!(
        engine.query(&library.id, QueryRequest::from_embedding(vec![1.0; DIM])),
        Err(QuarryError::NotFound(_))
    ));

    assert_eq!(engine.get_chunk(&other.id)?.id, other.id);
    assert_eq!(engine.list_libraries()?.len(), 1);
    Ok(())
}

#[test]
fn test_delete_document_removes_its_vectors() -> Result<()> {
    let engine = engine(IndexKind::BruteForce)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc_a = engine.create_document(&library.id, DocumentCreate::new("a"))?;
    let doc_b = engine.create_document(&library.id, DocumentCreate::new("b"))?;
    for i in 0..3 {
        engine.create_chunk(&doc_a.id, ChunkCreate::new("a").embedding(vec![i as f32; DIM]))?;
    }
    let kept = engine.create_chunk(&doc_b.id, ChunkCreate::new("b").embedding(vec![9.0; DIM]))?;

    engine.delete_document(&doc_a.id)?;

    assert_eq!(indexed_ids(&engine, &library.id)?, HashSet::from([kept.id]));
    let results = engine.query(&library.id, QueryRequest::from_embedding(vec![0.0; DIM]))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document_id, doc_b.id);
    Ok(())
}

#[test]
fn test_index_type_change_rebuilds() -> Result<()> {
    let engine = engine(IndexKind::Lsh)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    for i in 0..5 {
        engine.create_chunk(
            &doc.id,
            ChunkCreate::new("c").embedding(vec![i as f32, 1.0, 2.0, 3.0]),
        )?;
    }
    assert!(engine.coordinator().repository().is_persisted(&library.id));

    let updated = engine.update_library(
        &library.id,
        LibraryUpdate::default().index_type(IndexKind::BruteForce),
    )?;
    assert_eq!(updated.index_type, IndexKind::BruteForce);
    assert_eq!(engine.get_library(&library.id)?.index_type, IndexKind::BruteForce);

    let index = engine.coordinator().resolve(&library.id)?;
    assert_eq!(index.read().kind(), IndexKind::BruteForce);
    assert!(!engine.coordinator().repository().is_persisted(&library.id));
    assert_eq!(indexed_ids(&engine, &library.id)?, stored_chunk_ids(&engine, &library.id)?);

    let renamed = engine.update_library(&library.id, LibraryUpdate::default().name("renamed"))?;
    assert_eq!(renamed.name, "renamed");
    assert_eq!(renamed.index_type, IndexKind::BruteForce);
    Ok(())
}

#[test]
fn test_lsh_miss_falls_back_to_brute_force() -> Result<()> {
    let engine = engine(IndexKind::Lsh)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    let embedding = vec![0.4, -1.2, 0.7, 0.9];
    let chunk = engine.create_chunk(&doc.id, ChunkCreate::new("only").embedding(embedding.clone()))?;

    // The negated vector lands in the complementary bucket of every table.
    let query: Vec<f32> = embedding.iter().map(|x| -x).collect();
    let index = engine.coordinator().resolve(&library.id)?;
    assert!(index.read().search(&query, 5)?.is_empty());

    let results = engine.query(&library.id, QueryRequest::from_embedding(query))?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, chunk.id);
    Ok(())
}

#[test]
fn test_metadata_filters() -> Result<()> {
    let engine = engine(IndexKind::BruteForce)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    let en = engine.create_chunk(
        &doc.id,
        ChunkCreate::new("hello").embedding(vec![5.0; DIM]).metadata("lang", "en"),
    )?;
    for i in 0..10 {
        engine.create_chunk(
            &doc.id,
            ChunkCreate::new("hallo")
                .embedding(vec![i as f32 * 0.1; DIM])
                .metadata("lang", "de"),
        )?;
    }

    let results = engine.query(
        &library.id,
        QueryRequest::from_embedding(vec![0.0; DIM]).k(2).filter("lang", "en"),
    )?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk_id, en.id);
    assert_eq!(results[0].metadata.get("lang").map(String::as_str), Some("en"));

    let unfiltered = engine.query(&library.id, QueryRequest::from_embedding(vec![0.0; DIM]).k(2))?;
    assert_eq!(unfiltered.len(), 2);
    assert!(unfiltered.iter().all(|r| r.chunk_id != en.id));
    Ok(())
}

#[test]
fn test_k_bounds() -> Result<()> {
    let engine = engine(IndexKind::BruteForce)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let query = QueryRequest::from_embedding(vec![0.0; DIM]);
    assert!(matches!(
        engine.query(&library.id, query.clone().k(0)),
        Err(QuarryError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.query(&library.id, query.clone().k(51)),
        Err(QuarryError::InvalidArgument(_))
    ));
    assert!(engine.query(&library.id, query.k(50))?.is_empty());
    Ok(())
}

#[test]
fn test_metadata_only_update_keeps_index() -> Result<()> {
    let engine = engine(IndexKind::Lsh)?;
    let library = engine.create_library(LibraryCreate::new("lib"))?;
    let doc = engine.create_document(&library.id, DocumentCreate::new("doc"))?;
    let chunk = engine.create_chunk(&doc.id, ChunkCreate::new("t").embedding(vec![1.0; DIM]))?;

    let before = engine.coordinator().resolve(&library.id)?.read().ids();
    let updated = engine.update_chunk(
        &chunk.id,
        ChunkUpdate::default()
            .text("new text")
            .metadata([("k".to_string(), "v".to_string())].into()),
    )?;
    assert_eq!(updated.text, "new text");
    assert_eq!(updated.embedding, vec![1.0; DIM]);
    assert_eq!(engine.coordinator().resolve(&library.id)?.read().ids(), before);
    assert_eq!(engine.get_chunk(&chunk.id)?.metadata.get("k").map(String::as_str), Some("v"));
    Ok(())
}
