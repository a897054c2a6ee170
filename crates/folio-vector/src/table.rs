//! LanceDB persistence for [`VectorIndex`].
//!
//! An index directory is a LanceDB database holding an `entries` table and a
//! key/value `meta` table. Writes go to a sibling staging directory which is
//! renamed into place once complete, so a crash never leaves a half-written
//! index at the target path.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::cast::AsArray;
use arrow_array::{
    Array, FixedSizeListArray, Int64Array, ListArray, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMillisecondArray,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection};

use folio_core::{Chunk, ChunkKind, Distance, Error, IndexEntry, Result};

use crate::index::{IndexSchema, VectorIndex};
use crate::schema::{build_entries_schema, build_meta_schema, ENTRIES_TABLE, META_TABLE};

fn storage(e: impl Display) -> Error {
    Error::Storage(e.to_string())
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
    connect(dir.to_string_lossy().as_ref()).execute().await.map_err(storage)
}

impl VectorIndex {
    /// Write the index to `dir`, replacing a previous index there. A
    /// non-empty `dir` that is not a folio index is left alone and reported
    /// as a configuration error.
    pub async fn persist(&mut self, dir: &Path) -> Result<()> {
        ensure_replaceable(dir).await?;
        let staging = sibling(dir, "staging");
        let backup = sibling(dir, "old");
        for stale in [&staging, &backup] {
            if stale.exists() {
                std::fs::remove_dir_all(stale)?;
            }
        }
        std::fs::create_dir_all(&staging)?;

        let built_at = Utc::now();
        {
            let conn = open_db(&staging).await?;
            write_entries(&conn, self).await?;
            write_meta(&conn, &meta_pairs(self, built_at), built_at).await?;
        }

        if dir.exists() {
            std::fs::rename(dir, &backup)?;
        }
        std::fs::rename(&staging, dir)?;
        if backup.exists() {
            std::fs::remove_dir_all(&backup)?;
        }
        self.built_at = Some(built_at);
        tracing::info!(path = %dir.display(), entries = self.len(), "index persisted");
        Ok(())
    }

    /// Open an index written by [`VectorIndex::persist`].
    pub async fn load(dir: &Path, expected_dim: usize) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("index directory {}", dir.display())));
        }
        let conn = open_db(dir).await?;
        let meta = read_meta(&conn).await?;
        let field = |key: &str| meta.get(key).cloned().ok_or_else(|| Error::Storage(format!("index meta is missing '{key}'")));

        let dim: usize = field("dim")?.parse().map_err(storage)?;
        if dim != expected_dim {
            return Err(Error::IndexSchema(format!(
                "index at {} stores {dim}-dimensional vectors, embedder produces {expected_dim}",
                dir.display()
            )));
        }
        let distance = Distance::parse(&field("distance")?)
            .ok_or_else(|| Error::Storage("index meta has an unknown distance".into()))?;
        let model_id = field("model_id")?;
        let entry_count: usize = field("entry_count")?.parse().map_err(storage)?;

        let mut index = VectorIndex::new(IndexSchema { dim, distance, model_id });
        let entries = read_entries(&conn, entry_count).await?;
        if entries.len() != entry_count {
            return Err(Error::Storage(format!("expected {entry_count} entries, found {}", entries.len())));
        }
        index.add(entries)?;
        index.built_at = meta.get("built_at").and_then(|s| DateTime::parse_from_rfc3339(s).ok()).map(|t| t.with_timezone(&Utc));

        if let Some(expected) = meta.get("fingerprint") {
            if *expected != index.fingerprint() {
                return Err(Error::Storage(format!("index at {} failed its integrity check", dir.display())));
            }
        }
        tracing::info!(path = %dir.display(), entries = index.len(), model = index.model_id(), "index loaded");
        Ok(index)
    }
}

async fn ensure_replaceable(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let refuse = |why: &str| Error::InvalidConfig(format!("refusing to replace {}: {why}", dir.display()));
    if !dir.is_dir() {
        return Err(refuse("not a directory"));
    }
    if std::fs::read_dir(dir)?.next().is_none() {
        return Ok(());
    }
    let names = open_db(dir).await?.table_names().execute().await.map_err(storage)?;
    if names.iter().any(|n| n == META_TABLE) {
        Ok(())
    } else {
        Err(refuse("not a folio index"))
    }
}

fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "index".to_string());
    dir.with_file_name(format!("{name}.{suffix}"))
}

fn meta_pairs(index: &VectorIndex, built_at: DateTime<Utc>) -> Vec<(&'static str, String)> {
    let schema = index.schema();
    vec![
        ("dim", schema.dim.to_string()),
        ("distance", schema.distance.as_str().to_string()),
        ("model_id", schema.model_id.clone()),
        ("entry_count", index.len().to_string()),
        ("built_at", built_at.to_rfc3339()),
        ("fingerprint", index.fingerprint()),
    ]
}

async fn write_meta(conn: &Connection, pairs: &[(&'static str, String)], at: DateTime<Utc>) -> Result<()> {
    let schema = build_meta_schema();
    let rb = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(pairs.iter().map(|(k, _)| *k).collect::<Vec<_>>())),
            Arc::new(StringArray::from(pairs.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>())),
            Arc::new(TimestampMillisecondArray::from(vec![at.timestamp_millis(); pairs.len()])),
        ],
    )
    .map_err(storage)?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
    conn.create_table(META_TABLE, reader).execute().await.map_err(storage)?;
    Ok(())
}

async fn read_meta(conn: &Connection) -> Result<HashMap<String, String>> {
    let names = conn.table_names().execute().await.map_err(storage)?;
    if !names.iter().any(|n| n == META_TABLE) {
        return Err(Error::Storage("index has no meta table".into()));
    }
    let t = conn.open_table(META_TABLE).execute().await.map_err(storage)?;
    let mut stream = t.query().execute().await.map_err(storage)?;
    let mut out = HashMap::new();
    while let Some(batch) = stream.try_next().await.map_err(storage)? {
        let keys = string_column(&batch, "key")?;
        let values = string_column(&batch, "value")?;
        for i in 0..batch.num_rows() {
            out.insert(keys.value(i).to_string(), values.value(i).to_string());
        }
    }
    Ok(out)
}

async fn write_entries(conn: &Connection, index: &VectorIndex) -> Result<()> {
    let schema = build_entries_schema(index.schema().dim);
    if index.is_empty() {
        conn.create_empty_table(ENTRIES_TABLE, schema).execute().await.map_err(storage)?;
        return Ok(());
    }
    let rb = entries_batch(index, schema.clone())?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
    conn.create_table(ENTRIES_TABLE, reader).execute().await.map_err(storage)?;
    Ok(())
}

fn entries_batch(index: &VectorIndex, schema: Arc<arrow_schema::Schema>) -> Result<RecordBatch> {
    let entries = index.entries();
    let dim = i32::try_from(index.schema().dim).map_err(storage)?;
    let mut headings = ListBuilder::new(StringBuilder::new());
    for e in entries {
        for h in &e.chunk.headings {
            headings.values().append_value(h);
        }
        headings.append(true);
    }
    let vectors = entries.iter().map(|e| Some(e.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from((0..entries.len() as i64).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.text.as_str()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.source_path.as_str()).collect::<Vec<_>>())),
            Arc::new(Int64Array::from(entries.iter().map(|e| e.chunk.chunk_index as i64).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.project_name.as_deref()).collect::<Vec<_>>())),
            Arc::new(StringArray::from(entries.iter().map(|e| e.chunk.chunk_kind.as_str()).collect::<Vec<_>>())),
            Arc::new(headings.finish()),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim)),
        ],
    )
    .map_err(storage)
}

async fn read_entries(conn: &Connection, expected: usize) -> Result<Vec<IndexEntry>> {
    let t = conn.open_table(ENTRIES_TABLE).execute().await.map_err(storage)?;
    if expected == 0 {
        return Ok(Vec::new());
    }
    let mut rows: Vec<(i64, IndexEntry)> = Vec::with_capacity(expected);
    let mut stream = t.query().limit(expected).execute().await.map_err(storage)?;
    while let Some(batch) = stream.try_next().await.map_err(storage)? {
        let ordinal = int_column(&batch, "ordinal")?;
        let text = string_column(&batch, "text")?;
        let source = string_column(&batch, "source_path")?;
        let chunk_index = int_column(&batch, "chunk_index")?;
        let project = string_column(&batch, "project_name")?;
        let kind = string_column(&batch, "chunk_kind")?;
        let headings = batch
            .column_by_name("headings")
            .and_then(|c| c.as_any().downcast_ref::<ListArray>())
            .ok_or_else(|| Error::Storage("entries.headings column missing".into()))?;
        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| Error::Storage("entries.vector column missing".into()))?;

        for i in 0..batch.num_rows() {
            let chunk_kind = ChunkKind::parse(kind.value(i))
                .ok_or_else(|| Error::Storage(format!("unknown chunk kind '{}'", kind.value(i))))?;
            let heading_list = headings.value(i);
            let heading_values = heading_list.as_string::<i32>();
            let chunk = Chunk {
                text: text.value(i).to_string(),
                source_path: source.value(i).to_string(),
                chunk_index: usize::try_from(chunk_index.value(i)).map_err(storage)?,
                project_name: (!project.is_null(i)).then(|| project.value(i).to_string()),
                chunk_kind,
                headings: heading_values.iter().flatten().map(str::to_string).collect(),
            };
            let vector = vectors.value(i).as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
            rows.push((ordinal.value(i), IndexEntry { vector, chunk }));
        }
    }
    rows.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(rows.into_iter().map(|(_, e)| e).collect())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Storage(format!("column '{name}' missing")))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| Error::Storage(format!("column '{name}' missing")))
}
