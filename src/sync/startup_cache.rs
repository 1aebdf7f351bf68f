//! Replay of previously persisted table chunks before live sync.
//!
//! Layout: `<root>/<chainIdHex>/<table>/<table>_<firstBlock>-<lastBlock>.json`,
//! each file a JSON array of raw source rows. Over HTTP the chunk list of a
//! table is served as `<base>/<chainIdHex>/<table>/chunks.json`.

use super::combined::CombinedSyncer;
use crate::datasource::SubgraphStartBlocks;
use crate::domain::ChainId;
use crate::tables::TableName;
use backoff::backoff::Constant;
use backoff::future::retry_notify;
use futures::future::try_join_all;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const STARTUP_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const HTTP_MAX_ATTEMPTS: usize = 5;
pub const HTTP_RETRY_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StartupCacheError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("invalid chunk list: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("chunk {0} is missing")]
    MissingChunk(String),
    #[error("failed to ingest chunk {chunk}: {message}")]
    Ingest { chunk: String, message: String },
}

/// A chunk file name, `<table>_<first>-<last>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkName {
    pub table: TableName,
    pub first_block: i64,
    pub last_block: i64,
    pub name: String,
}

impl ChunkName {
    pub fn parse(name: &str) -> Option<Self> {
        let (table, range) = name.split_once('_')?;
        let table = TableName::from_source_key(table)?;
        let range = range.strip_suffix(".json")?;
        let (first, last) = range.split_once('-')?;
        Some(ChunkName {
            table,
            first_block: first.parse().ok()?,
            last_block: last.parse().ok()?,
            name: name.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum StartupCacheProvider {
    Local {
        root: PathBuf,
        chain_id: ChainId,
    },
    Http {
        base: String,
        chain_id: ChainId,
        client: reqwest::Client,
        retry_wait: Duration,
    },
}

impl StartupCacheProvider {
    /// `source` is a local directory or an `http(s)://` base URL.
    pub fn new(source: &str, chain_id: ChainId) -> Result<Self, StartupCacheError> {
        if source.starts_with("http") {
            let client = reqwest::Client::builder()
                .timeout(STARTUP_FETCH_TIMEOUT)
                .build()
                .map_err(|e| StartupCacheError::Http {
                    url: source.to_string(),
                    message: e.to_string(),
                })?;
            Ok(StartupCacheProvider::Http {
                base: source.trim_end_matches('/').to_string(),
                chain_id,
                client,
                retry_wait: HTTP_RETRY_WAIT,
            })
        } else {
            Ok(StartupCacheProvider::Local {
                root: PathBuf::from(source),
                chain_id,
            })
        }
    }

    /// Chunk names of one table, ordered by first block.
    pub async fn chunks(&self, table: TableName) -> Result<Vec<ChunkName>, StartupCacheError> {
        let names: Vec<String> = match self {
            StartupCacheProvider::Local { root, chain_id } => {
                let dir = root.join(chain_id.as_str()).join(table.source_key());
                let mut entries = match tokio::fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(source) => {
                        return Err(StartupCacheError::Io {
                            path: dir.display().to_string(),
                            source,
                        })
                    }
                };
                let mut names = Vec::new();
                while let Some(entry) =
                    entries
                        .next_entry()
                        .await
                        .map_err(|source| StartupCacheError::Io {
                            path: dir.display().to_string(),
                            source,
                        })?
                {
                    if let Some(name) = entry.file_name().to_str() {
                        names.push(name.to_string());
                    }
                }
                names
            }
            StartupCacheProvider::Http { .. } => {
                let url = self.table_url(table, "chunks.json");
                match self.fetch(&url).await? {
                    Some(body) => serde_json::from_slice(&body)?,
                    None => Vec::new(),
                }
            }
        };

        let mut chunks: Vec<ChunkName> = names
            .iter()
            .filter_map(|name| ChunkName::parse(name))
            .filter(|chunk| chunk.table == table)
            .collect();
        chunks.sort_by_key(|chunk| chunk.first_block);
        Ok(chunks)
    }

    /// The raw bytes of one chunk, `None` if the server does not have it.
    pub async fn chunk(&self, chunk: &ChunkName) -> Result<Option<Vec<u8>>, StartupCacheError> {
        match self {
            StartupCacheProvider::Local { root, chain_id } => {
                let path = root
                    .join(chain_id.as_str())
                    .join(chunk.table.source_key())
                    .join(&chunk.name);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(StartupCacheError::Io {
                        path: path.display().to_string(),
                        source,
                    }),
                }
            }
            StartupCacheProvider::Http { .. } => {
                let url = self.table_url(chunk.table, &chunk.name);
                self.fetch(&url).await
            }
        }
    }

    fn table_url(&self, table: TableName, file: &str) -> String {
        match self {
            StartupCacheProvider::Http { base, chain_id, .. } => {
                format!("{}/{}/{}/{}", base, chain_id, table.source_key(), file)
            }
            StartupCacheProvider::Local { .. } => file.to_string(),
        }
    }

    /// GET with up to `HTTP_MAX_ATTEMPTS` tries. 404 is an answer, not a
    /// failure.
    async fn fetch(&self, url: &str) -> Result<Option<Vec<u8>>, StartupCacheError> {
        let StartupCacheProvider::Http {
            client, retry_wait, ..
        } = self
        else {
            return Ok(None);
        };

        let attempts = AtomicUsize::new(0);
        retry_notify(
            Constant::new(*retry_wait),
            || async {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let give_up = |err: StartupCacheError| {
                    if attempt >= HTTP_MAX_ATTEMPTS {
                        backoff::Error::permanent(err)
                    } else {
                        backoff::Error::transient(err)
                    }
                };

                let resp = client.get(url).send().await.map_err(|e| {
                    give_up(StartupCacheError::Http {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
                })?;
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    return Err(give_up(StartupCacheError::Http {
                        url: url.to_string(),
                        message: format!("status {}", status.as_u16()),
                    }));
                }
                let body = resp.bytes().await.map_err(|e| {
                    give_up(StartupCacheError::Http {
                        url: url.to_string(),
                        message: e.to_string(),
                    })
                })?;
                Ok(Some(body.to_vec()))
            },
            |err: StartupCacheError, wait: Duration| {
                warn!(error = %err, retry_in = ?wait, "Startup cache fetch failed");
            },
        )
        .await
    }
}

/// Replay every chunk of every table through `syncer`, interleaving tables
/// by first block. Stops at the first failure; the cursors reached so far
/// are installed on the syncer either way and returned.
pub async fn load_startup_cache(
    provider: &StartupCacheProvider,
    syncer: &mut CombinedSyncer,
) -> SubgraphStartBlocks {
    let mut cursors = syncer.cursors();
    if let Err(e) = replay_chunks(provider, syncer, &mut cursors).await {
        warn!(error = %e, "Startup cache replay stopped early");
    }
    syncer.set_start_blocks(cursors);
    info!(
        swaps = cursors.swaps,
        aggs = cursors.aggs,
        bal = cursors.bal,
        liq = cursors.liq,
        fee = cursors.fee,
        ko = cursors.ko,
        "Startup cache loaded"
    );
    cursors
}

async fn replay_chunks(
    provider: &StartupCacheProvider,
    syncer: &mut CombinedSyncer,
    cursors: &mut SubgraphStartBlocks,
) -> Result<(), StartupCacheError> {
    let listings = try_join_all(TableName::ALL.into_iter().map(|t| provider.chunks(t))).await?;
    let mut all: Vec<ChunkName> = listings.into_iter().flatten().collect();
    // Stable: chunks sharing a first block keep table order.
    all.sort_by_key(|chunk| chunk.first_block);
    let max_block = all.iter().map(|c| c.last_block).max().unwrap_or(0);

    for chunk in all {
        info!(chunk = %chunk.name, "Loading startup chunk");
        let bytes = provider
            .chunk(&chunk)
            .await?
            .ok_or_else(|| StartupCacheError::MissingChunk(chunk.name.clone()))?;
        let rows: serde_json::Value = serde_json::from_slice(&bytes)?;

        let outcome = syncer
            .ingest_table(chunk.table, &rows, cursors.get(chunk.table), max_block)
            .await
            .map_err(|e| StartupCacheError::Ingest {
                chunk: chunk.name.clone(),
                message: e.to_string(),
            })?;
        cursors.advance(chunk.table, outcome.last_observed);
    }
    Ok(())
}
