//! Dedicated writer task for stream connections.
//!
//! Every stream connection gets one writer task fed by an mpsc channel.
//! Producers (a server connection answering requests, a publisher fanning
//! out) never touch the socket directly, and messages queued together leave
//! in a single vectored write.
//!
//! ```text
//! producer ─┐
//! producer ─┼─► mpsc::Sender<Bytes> ─► writer task ─► [len][body][len][body] ─► stream
//! producer ─┘
//! ```

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::message::Message;
use super::message_buffer::{length_prefix, LENGTH_PREFIX_SIZE};
use crate::error::{IpcError, Result};

/// Maximum messages coalesced into one write.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for queueing messages on a writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue a message, waiting for room in the channel.
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.tx
            .send(msg.into_bytes())
            .await
            .map_err(|_| IpcError::Closed)
    }

    /// Raw channel sender, for fan-out hubs that queue frozen bytes.
    pub fn link(&self) -> mpsc::Sender<Bytes> {
        self.tx.clone()
    }
}

/// Spawn the writer task on the current runtime.
///
/// The task ends cleanly once every handle is dropped, or with the first
/// write error. A batch that cannot be written within `write_timeout` (a
/// peer that stopped reading) ends it with `Timeout`.
pub fn spawn_writer_task<W>(
    writer: W,
    capacity: usize,
    write_timeout: Duration,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(async move {
        let result = writer_loop(rx, writer, write_timeout).await;
        if let Err(e) = &result {
            debug!("connection writer stopped: {}", e);
        }
        result
    });

    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    write_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(msg) => batch.push(msg),
                Err(_) => break,
            }
        }

        tokio::time::timeout(write_timeout, write_batch(&mut writer, &batch))
            .await
            .map_err(|_| IpcError::Timeout)??;
    }

    Ok(())
}

/// Write a batch of length-delimited messages with `write_vectored`.
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let prefixes: Vec<[u8; LENGTH_PREFIX_SIZE]> =
        batch.iter().map(|body| length_prefix(body.len())).collect();
    let total_size: usize = batch.iter().map(|b| LENGTH_PREFIX_SIZE + b.len()).sum();

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(&prefixes, batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(IpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// IoSlices covering everything after the first `skip_bytes` bytes.
fn build_remaining_slices<'a>(
    prefixes: &'a [[u8; LENGTH_PREFIX_SIZE]],
    batch: &'a [Bytes],
    skip_bytes: usize,
) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for (prefix, body) in prefixes.iter().zip(batch) {
        for part in [&prefix[..], &body[..]] {
            let end = offset + part.len();
            if skip_bytes < end && !part.is_empty() {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
