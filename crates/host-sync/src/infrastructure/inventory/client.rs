//! Upstream inventory subscription.
//!
//! [`InventoryClient`] is the seam the daemon subscribes through. The shipped
//! implementation, [`NdjsonInventory`], reads watch events as newline-delimited
//! JSON from a file or stdin, which is how the daemon is fed by a relay process
//! or replayed in tests.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;
use tokio::select;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::types::InventoryError;
use super::types::WatchEvent;

/// Source path meaning "read from stdin".
pub const STDIN_SOURCE: &str = "-";

/// Options for [`NdjsonInventory::init`].
#[derive(Debug, Clone)]
pub struct InventoryOptions {
    /// File to read, or [`STDIN_SOURCE`].
    pub source: PathBuf,
    /// Depth of the channel between the reader and the watch loop.
    pub buffer: usize,
}

impl Default for InventoryOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::from(STDIN_SOURCE),
            buffer: 32,
        }
    }
}

/// A subscription to host lifecycle events.
#[async_trait::async_trait]
pub trait InventoryClient: Send + Sync {
    /// Start the host watch and return its event stream.
    ///
    /// # Errors
    ///
    /// - [`InventoryError::SourceUnavailable`] if the upstream cannot be reached
    /// - [`InventoryError::AlreadyWatching`] if a watch is already running
    async fn watch_hosts(&self) -> Result<mpsc::Receiver<WatchEvent>, Report<InventoryError>>;

    /// Stop the watch and release the upstream connection.
    async fn shutdown(&self);
}

/// Inventory client reading newline-delimited [`WatchEvent`] JSON.
pub struct NdjsonInventory {
    options: InventoryOptions,
    token: CancellationToken,
    started: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl NdjsonInventory {
    pub fn init(options: InventoryOptions) -> Self {
        info!(source = %options.source.display(), "Inventory client initialised");
        Self {
            options,
            token: CancellationToken::new(),
            started: AtomicBool::new(false),
            reader: Mutex::new(None),
        }
    }

    async fn open_source(&self) -> Result<Box<dyn AsyncRead + Send + Unpin>, Report<InventoryError>> {
        if self.options.source.as_os_str() == STDIN_SOURCE {
            return Ok(Box::new(tokio::io::stdin()));
        }
        let file = tokio::fs::File::open(&self.options.source)
            .await
            .change_context_lazy(|| InventoryError::SourceUnavailable {
                message: format!("cannot open {}", self.options.source.display()),
            })?;
        Ok(Box::new(file))
    }
}

#[async_trait::async_trait]
impl InventoryClient for NdjsonInventory {
    async fn watch_hosts(&self) -> Result<mpsc::Receiver<WatchEvent>, Report<InventoryError>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Report::new(InventoryError::AlreadyWatching));
        }
        let source = match self.open_source().await {
            Ok(source) => source,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.options.buffer.max(1));
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            read_events(source, tx, token).await;
        });
        *self.reader.lock().await = Some(handle);
        Ok(rx)
    }

    async fn shutdown(&self) {
        self.token.cancel();
        if let Some(handle) = self.reader.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Inventory reader task failed: {e}");
            }
        }
        info!("Inventory client shut down");
    }
}

/// Parse one [`WatchEvent`] per line from `source` into `tx`.
///
/// Blank lines are skipped and unparsable lines are logged and skipped. Ends at
/// end of input, on a read error, when the receiver is gone or on cancellation.
pub(crate) async fn read_events<R>(source: R, tx: mpsc::Sender<WatchEvent>, token: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(source).lines();
    let mut line_no = 0_u64;
    loop {
        let line = select! {
            _ = token.cancelled() => {
                debug!("Inventory reader cancelled");
                return;
            }
            line = lines.next_line() => line,
        };
        line_no += 1;

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Inventory source reached end of input");
                return;
            }
            Err(e) => {
                warn!("Failed to read inventory source: {e}");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<WatchEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, "Skipping unparsable inventory event: {e}");
                continue;
            }
        };

        select! {
            _ = token.cancelled() => return,
            sent = tx.send(event) => {
                if sent.is_err() {
                    debug!("Inventory event receiver dropped");
                    return;
                }
            }
        }
    }
}
