//! Partial-failure aggregation for batch operations.
//!
//! A batch never stops on the first bad item: successes and failures are
//! folded into a [`BatchReport`] that is logged at the end of the run.

use std::fmt;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Split,
    Embed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Load => "load",
            Self::Split => "split",
            Self::Embed => "embed",
        })
    }
}

/// One item that was skipped, with the reason.
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    /// File path or `path#chunk_index`.
    pub item: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub documents: usize,
    pub chunks: usize,
    pub indexed: usize,
    pub failures: Vec<Failure>,
}

impl BatchReport {
    pub fn record_failure(&mut self, stage: Stage, item: impl Into<String>, error: Error) {
        let item = item.into();
        tracing::warn!(%stage, item = %item, error = %error, "skipping item");
        self.failures.push(Failure { stage, item, error });
    }

    /// Fold a sequence of per-item outcomes, keeping successes in order.
    pub fn fold<T, I>(&mut self, stage: Stage, outcomes: I) -> Vec<T>
    where
        I: IntoIterator<Item = (String, Result<T, Error>)>,
    {
        let mut ok = Vec::new();
        for (item, outcome) in outcomes {
            match outcome {
                Ok(value) => ok.push(value),
                Err(error) => self.record_failure(stage, item, error),
            }
        }
        ok
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.documents += other.documents;
        self.chunks += other.chunks;
        self.indexed += other.indexed;
        self.failures.extend(other.failures);
    }

    pub fn failed(&self, stage: Stage) -> usize {
        self.failures.iter().filter(|f| f.stage == stage).count()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            documents = self.documents,
            chunks = self.chunks,
            indexed = self.indexed,
            load_failures = self.failed(Stage::Load),
            split_failures = self.failed(Stage::Split),
            embed_failures = self.failed(Stage::Embed),
            "batch finished"
        );
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents, {} chunks, {} indexed; skipped: {} load, {} split, {} embed",
            self.documents,
            self.chunks,
            self.indexed,
            self.failed(Stage::Load),
            self.failed(Stage::Split),
            self.failed(Stage::Embed),
        )
    }
}
