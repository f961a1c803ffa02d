//! Storage write strategies
//!
//! Some storage backends hand out an asynchronous writable stream per key;
//! others only allow a synchronous, single-owner handle that must be driven
//! from one dedicated execution context. Both sit behind [`WriteStrategy`],
//! and the strategy is chosen once when the cache is opened.
//!
//! - [`StreamWriter`] opens a `tokio::fs::File` per write.
//! - [`DedicatedWriter`] owns a background thread holding every write
//!   handle. Open/write/close commands are processed strictly in the order
//!   received.
//!
//! A session that receives an `Err` item is aborted: the file is truncated to
//! zero length, so its size can never match the size recorded in metadata.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::constants::{cache, stream};
use crate::errors::{CacheError, CacheResult};

use super::config::WriteMode;

/// Chunks fed into a write session; an `Err` item aborts the session
pub type ChunkStream<'a> = BoxStream<'a, io::Result<Bytes>>;

/// A way of getting a byte stream into a cache file
#[async_trait]
pub trait WriteStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs and statistics
    fn name(&self) -> &'static str;

    /// Truncate `path`, then copy `chunks` into it in order.
    ///
    /// Returns the number of bytes written. When the stream yields an error
    /// the session stops and the file is left empty.
    async fn write(&self, path: &Path, chunks: ChunkStream<'_>) -> CacheResult<u64>;
}

/// Pick the strategy for `mode`, probing `root` when asked to
pub async fn select_strategy(mode: WriteMode, root: &Path) -> CacheResult<Arc<dyn WriteStrategy>> {
    let strategy: Arc<dyn WriteStrategy> = match mode {
        WriteMode::Stream => Arc::new(StreamWriter),
        WriteMode::Dedicated => Arc::new(DedicatedWriter::spawn()?),
        WriteMode::Auto => {
            if supports_async_handles(root).await {
                Arc::new(StreamWriter)
            } else {
                Arc::new(DedicatedWriter::spawn()?)
            }
        }
    };

    info!("Using {} cache write strategy", strategy.name());
    Ok(strategy)
}

/// Try to open an async writable handle under `root`
async fn supports_async_handles(root: &Path) -> bool {
    let probe = root.join(cache::WRITE_PROBE_FILE);
    let result = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&probe)
        .await;

    match result {
        Ok(file) => {
            drop(file);
            let _ = fs::remove_file(&probe).await;
            true
        }
        Err(e) => {
            warn!(
                "Async write handles unavailable under {} ({}), falling back to dedicated writer",
                root.display(),
                e
            );
            false
        }
    }
}

fn aborted(path: &Path, e: io::Error) -> CacheError {
    CacheError::WriteAborted {
        key: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// One async file handle per write
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamWriter;

#[async_trait]
impl WriteStrategy for StreamWriter {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn write(&self, path: &Path, mut chunks: ChunkStream<'_>) -> CacheResult<u64> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;

        let mut written = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = file.set_len(0).await;
                    return Err(aborted(path, e));
                }
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        debug!("Wrote {} bytes to {}", written, path.display());
        Ok(written)
    }
}

enum WriterCommand {
    Open {
        session: u64,
        path: PathBuf,
        reply: oneshot::Sender<io::Result<()>>,
    },
    Write {
        session: u64,
        chunk: Bytes,
        reply: oneshot::Sender<io::Result<()>>,
    },
    Close {
        session: u64,
        discard: bool,
        reply: oneshot::Sender<io::Result<()>>,
    },
}

/// Single-writer strategy backed by a dedicated thread
///
/// The thread owns every open handle, keyed by a session id. Commands from
/// concurrent sessions interleave at chunk granularity, so a producer that
/// stops sending never holds up writes to other keys.
pub struct DedicatedWriter {
    commands: mpsc::Sender<WriterCommand>,
    next_session: AtomicU64,
}

impl fmt::Debug for DedicatedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedicatedWriter")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl DedicatedWriter {
    /// Start the writer thread
    ///
    /// The thread exits once the writer (and with it the command sender) is
    /// dropped.
    pub fn spawn() -> CacheResult<Self> {
        let (commands, rx) = mpsc::channel(stream::DEDICATED_WRITER_CAPACITY);
        std::thread::Builder::new()
            .name("cache-writer".to_string())
            .spawn(move || Self::run(rx))?;

        debug!("Dedicated cache writer thread started");
        Ok(Self {
            commands,
            next_session: AtomicU64::new(0),
        })
    }

    fn run(mut rx: mpsc::Receiver<WriterCommand>) {
        let mut handles: HashMap<u64, std::fs::File> = HashMap::new();

        while let Some(command) = rx.blocking_recv() {
            match command {
                WriterCommand::Open {
                    session,
                    path,
                    reply,
                } => {
                    let result = std::fs::OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(true)
                        .open(&path)
                        .map(|file| {
                            handles.insert(session, file);
                        });
                    let _ = reply.send(result);
                }
                WriterCommand::Write {
                    session,
                    chunk,
                    reply,
                } => {
                    let result = match handles.get_mut(&session) {
                        Some(file) => file.write_all(&chunk),
                        None => Err(io::Error::new(
                            io::ErrorKind::NotConnected,
                            "no open write session",
                        )),
                    };
                    let _ = reply.send(result);
                }
                WriterCommand::Close {
                    session,
                    discard,
                    reply,
                } => {
                    let result = match handles.remove(&session) {
                        Some(file) if discard => file.set_len(0),
                        Some(mut file) => file.flush().and_then(|_| file.sync_all()),
                        None => Ok(()),
                    };
                    let _ = reply.send(result);
                }
            }
        }

        debug!(
            "Dedicated cache writer thread exiting ({} sessions left open)",
            handles.len()
        );
    }

    async fn request<F>(&self, build: F) -> CacheResult<()>
    where
        F: FnOnce(oneshot::Sender<io::Result<()>>) -> WriterCommand,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| CacheError::WriterUnavailable)?;
        response.await.map_err(|_| CacheError::WriterUnavailable)??;
        Ok(())
    }
}

#[async_trait]
impl WriteStrategy for DedicatedWriter {
    fn name(&self) -> &'static str {
        "dedicated"
    }

    async fn write(&self, path: &Path, mut chunks: ChunkStream<'_>) -> CacheResult<u64> {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);

        let path_buf = path.to_path_buf();
        self.request(|reply| WriterCommand::Open {
            session,
            path: path_buf,
            reply,
        })
        .await?;

        let mut written = 0u64;
        let mut outcome = Ok(());
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    outcome = Err(aborted(path, e));
                    break;
                }
            };
            let len = chunk.len() as u64;
            if let Err(e) = self
                .request(|reply| WriterCommand::Write {
                    session,
                    chunk,
                    reply,
                })
                .await
            {
                outcome = Err(e);
                break;
            }
            written += len;
        }

        // Always close so the thread releases the handle
        let closed = self
            .request(|reply| WriterCommand::Close {
                session,
                discard: outcome.is_err(),
                reply,
            })
            .await;
        outcome?;
        closed?;

        debug!(
            "Dedicated writer wrote {} bytes to {}",
            written,
            path.display()
        );
        Ok(written)
    }
}
