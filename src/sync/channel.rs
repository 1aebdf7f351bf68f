//! Per-table ingest with row-id deduplication.

use crate::orchestration::Ingest;
use crate::tables::{RowContext, RowError, Table, TableName, PAGE_SIZE};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{table}: malformed response: {source}")]
    Decode {
        table: TableName,
        #[source]
        source: serde_json::Error,
    },
    #[error("{table}: {source}")]
    Row {
        table: TableName,
        #[source]
        source: RowError,
    },
}

/// Outcome of one page of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Highest block seen in the page, or the query cursor if none was higher.
    pub last_observed: i64,
    /// Another query may return rows this one did not.
    pub has_more: bool,
    pub fresh: usize,
}

pub struct SyncChannel<T: Table> {
    ctx: RowContext,
    seen: HashSet<String>,
    rows_ingested: u64,
    _table: PhantomData<T>,
}

impl<T: Table> fmt::Debug for SyncChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncChannel")
            .field("table", &T::NAME)
            .field("network", &self.ctx.network)
            .field("seen", &self.seen.len())
            .finish()
    }
}

impl<T: Table> SyncChannel<T> {
    pub fn new(ctx: RowContext) -> Self {
        Self {
            ctx,
            seen: HashSet::new(),
            rows_ingested: 0,
            _table: PhantomData,
        }
    }

    pub fn rows_ingested(&self) -> u64 {
        self.rows_ingested
    }

    /// Decode one page of raw rows and hand every row not seen before to
    /// `sink`. The page is all-or-nothing: if any row fails to decode,
    /// nothing is ingested.
    pub async fn ingest_entries<I>(
        &mut self,
        sink: &I,
        data: &serde_json::Value,
        cursor: i64,
        max_block: i64,
    ) -> Result<IngestOutcome, SyncError>
    where
        I: Ingest<T::Row> + ?Sized,
    {
        let raws: Vec<T::Raw> = if data.is_null() {
            Vec::new()
        } else {
            Vec::<T::Raw>::deserialize(data).map_err(|source| SyncError::Decode {
                table: T::NAME,
                source,
            })?
        };
        let page_len = raws.len();

        let rows = raws
            .into_iter()
            .map(|raw| T::convert(raw, &self.ctx))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| SyncError::Row {
                table: T::NAME,
                source,
            })?;

        let mut last_observed = cursor;
        let mut fresh = 0;
        for row in rows {
            last_observed = last_observed.max(T::row_block(&row));
            if self.seen.insert(T::row_id(&row).to_string()) {
                fresh += 1;
                sink.ingest(row).await;
            }
        }

        self.rows_ingested += fresh as u64;
        if fresh > 0 {
            info!(
                table = %T::NAME,
                network = %self.ctx.network,
                fresh,
                total = self.rows_ingested,
                cursor,
                max_block,
                "Loaded rows from subgraph"
            );
        }

        Ok(IngestOutcome {
            last_observed,
            has_more: fresh > 0 || page_len == PAGE_SIZE,
            fresh,
        })
    }
}
