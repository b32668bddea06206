//! Stream transports: Unix domain sockets (`ipc://`) and TCP (`tcp://`).
//!
//! Both hand out a connection as a boxed read half and a boxed write half.
//! Reads go through [`MessageReader`], writes through the connection writer
//! task, so message boundaries survive the byte stream.
//!
//! # Example
//!
//! ```ignore
//! let listener = StreamListener::bind(&address).await?;
//! let (reader, writer) = listener.accept().await?;
//! ```

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use super::address::{Address, Scheme};
use super::message::Message;
use super::message_buffer::MessageBuffer;
use crate::error::{IpcError, Result};

/// Read half of a stream connection.
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

/// Write half of a stream connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Listening stream socket.
pub enum StreamListener {
    /// Unix domain socket.
    #[cfg(unix)]
    Unix {
        /// Bound listener.
        listener: tokio::net::UnixListener,
        /// Filesystem path of the socket.
        path: String,
    },
    /// TCP listener.
    Tcp(TcpListener),
}

impl StreamListener {
    /// Bind to a stream address.
    ///
    /// A socket file left behind at an `ipc://` path is removed first, but
    /// only if nothing accepts connections on it any more.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for `inproc://` (or `ipc://` off Unix),
    /// `AddressInUse` if a live listener owns the address, and `Io` if the
    /// bind fails otherwise.
    pub async fn bind(address: &Address) -> Result<Self> {
        let listener = match address.scheme() {
            #[cfg(unix)]
            Scheme::Ipc => {
                let path = address.target();
                remove_stale_socket(address).await?;
                let listener = tokio::net::UnixListener::bind(path).map_err(bind_error(address))?;
                StreamListener::Unix {
                    listener,
                    path: path.to_string(),
                }
            }
            Scheme::Tcp => StreamListener::Tcp(
                TcpListener::bind(address.target())
                    .await
                    .map_err(bind_error(address))?,
            ),
            _ => return Err(unsupported(address)),
        };

        debug!(address = %address, "stream listener bound");
        Ok(listener)
    }

    /// Accept one connection.
    pub async fn accept(&self) -> Result<(BoxedReader, BoxedWriter)> {
        match self {
            #[cfg(unix)]
            StreamListener::Unix { listener, .. } => {
                let (stream, _addr) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            StreamListener::Tcp(listener) => {
                let (stream, _addr) = listener.accept().await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }

    /// Local address actually bound (useful with TCP port 0).
    pub fn local_address(&self) -> Result<Address> {
        match self {
            #[cfg(unix)]
            StreamListener::Unix { path, .. } => Address::resolve(path, Scheme::Ipc),
            StreamListener::Tcp(listener) => {
                Address::resolve(&listener.local_addr()?.to_string(), Scheme::Tcp)
            }
        }
    }

    /// Guard that removes the socket file when dropped, if there is one.
    ///
    /// Kept apart from the listener so the file goes away as soon as the
    /// owning socket is released, even while the accept task winds down.
    pub fn cleanup_guard(&self) -> Option<SocketCleanup> {
        match self {
            #[cfg(unix)]
            StreamListener::Unix { path, .. } => Some(SocketCleanup { path: path.clone() }),
            StreamListener::Tcp(_) => None,
        }
    }
}

/// Removes a Unix socket file on drop.
#[derive(Debug)]
pub struct SocketCleanup {
    path: String,
}

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Connect to a listening stream address.
pub async fn connect(address: &Address) -> Result<(BoxedReader, BoxedWriter)> {
    match address.scheme() {
        #[cfg(unix)]
        Scheme::Ipc => {
            let stream = tokio::net::UnixStream::connect(address.target()).await?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        Scheme::Tcp => {
            let stream = TcpStream::connect(address.target()).await?;
            stream.set_nodelay(true)?;
            let (reader, writer) = stream.into_split();
            Ok((Box::new(reader), Box::new(writer)))
        }
        _ => Err(unsupported(address)),
    }
}

/// Remove the socket file at an `ipc://` path unless someone listens on it.
#[cfg(unix)]
async fn remove_stale_socket(address: &Address) -> Result<()> {
    let path = address.target();
    if !std::path::Path::new(path).exists() {
        return Ok(());
    }

    match tokio::net::UnixStream::connect(path).await {
        Ok(_) => Err(IpcError::AddressInUse(address.to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            debug!(address = %address, "removing stale socket file");
            std::fs::remove_file(path)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IpcError::Io(e)),
    }
}

fn bind_error(address: &Address) -> impl Fn(std::io::Error) -> IpcError + '_ {
    move |e| match e.kind() {
        std::io::ErrorKind::AddrInUse => IpcError::AddressInUse(address.to_string()),
        _ => IpcError::Io(e),
    }
}

fn unsupported(address: &Address) -> IpcError {
    IpcError::Unsupported(format!("{} is not a stream address", address))
}

/// Reads length-delimited messages off a stream.
pub struct MessageReader {
    reader: BoxedReader,
    buffer: MessageBuffer,
    ready: VecDeque<Message>,
    chunk: Vec<u8>,
}

impl MessageReader {
    /// Wrap a read half.
    pub fn new(reader: BoxedReader, max_message_size: usize) -> Self {
        Self {
            reader,
            buffer: MessageBuffer::new(max_message_size),
            ready: VecDeque::new(),
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Next complete message, or `None` once the peer closed the stream.
    ///
    /// Cancel safe: bytes read before a cancellation stay buffered.
    pub async fn next(&mut self) -> Result<Option<Message>> {
        loop {
            if let Some(msg) = self.ready.pop_front() {
                return Ok(Some(msg));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if !self.buffer.is_empty() {
                    debug!(
                        buffered = self.buffer.len(),
                        "stream closed mid-message"
                    );
                }
                return Ok(None);
            }

            self.ready.extend(self.buffer.push(&self.chunk[..n])?);
        }
    }
}
