//! Bounded capture of child output streams.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::debug;

const READ_CHUNK: usize = 8 * 1024;

/// Byte buffer that keeps at most `limit` bytes and remembers whether more arrived.
#[derive(Debug, Default)]
pub struct BoundedBuffer {
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedBuffer {
    /// Creates an empty buffer with the given capacity limit.
    pub fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Appends as much of `chunk` as fits; the rest is dropped.
    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if bytes were discarded.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Consumes the buffer, returning the kept bytes and the truncation flag.
    pub fn into_parts(self) -> (Vec<u8>, bool) {
        (self.data, self.truncated)
    }
}

/// Shared handle to a buffer being filled by a drain task.
pub type SharedBuffer = Arc<Mutex<BoundedBuffer>>;

/// Spawns a task that reads `stream` to EOF into a bounded buffer.
///
/// Reading continues after the limit is hit so the child never blocks on a
/// full pipe. The buffer stays readable through the returned handle even if
/// the task is aborted.
pub fn spawn_drain<R>(stream: R, limit: usize, label: &'static str) -> (SharedBuffer, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: SharedBuffer = Arc::new(Mutex::new(BoundedBuffer::new(limit)));
    let sink = Arc::clone(&buffer);

    let handle = tokio::spawn(async move {
        let mut stream = stream;
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut buf = sink.lock().unwrap_or_else(|e| e.into_inner());
                    buf.push(&chunk[..n]);
                }
                Err(e) => {
                    debug!("Stopped reading {label}: {e}");
                    break;
                }
            }
        }
    });

    (buffer, handle)
}

/// Takes the captured bytes out of a shared buffer.
pub fn take_buffer(buffer: &SharedBuffer) -> (Vec<u8>, bool) {
    let mut guard = buffer.lock().unwrap_or_else(|e| e.into_inner());
    let limit = guard.limit;
    std::mem::replace(&mut *guard, BoundedBuffer::new(limit)).into_parts()
}
