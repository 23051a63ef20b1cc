//! One relay session: the broker connection behind a client session.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Buffered read side of a session's socket, owned by its inbound reader.
pub type SessionInput = BufReader<BoxedReader>;

/// Upper bound on the best-effort socket shutdown during close.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Holds the write side of a broker connection and its close signal.
///
/// The read side is handed to the session's inbound reader at construction.
/// Writes are serialized by a per-session mutex, so concurrent forwards for
/// one session never interleave bytes on the wire.
pub struct RelaySession {
    epoch: u64,
    peer: Option<SocketAddr>,
    output: Mutex<BufWriter<BoxedWriter>>,
    closed: CancellationToken,
}

impl RelaySession {
    /// Wrap any byte stream. Returns the session and its buffered input.
    pub fn new<S>(stream: S) -> (Self, SessionInput)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::from_halves(Box::new(read), Box::new(write), None)
    }

    /// Wrap an established broker connection.
    pub fn from_tcp(stream: TcpStream) -> (Self, SessionInput) {
        let peer = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        Self::from_halves(Box::new(read), Box::new(write), peer)
    }

    fn from_halves(
        read: BoxedReader,
        write: BoxedWriter,
        peer: Option<SocketAddr>,
    ) -> (Self, SessionInput) {
        let session = Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            peer,
            output: Mutex::new(BufWriter::new(write)),
            closed: CancellationToken::new(),
        };
        (session, BufReader::new(read))
    }

    /// Unique per session instance, even when a session id is reused.
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub const fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Token cancelled when the session is closed.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Write one complete frame and flush it.
    ///
    /// Fails with `BrokenPipe` once the session is closed, including while
    /// a write is blocked on the socket.
    pub async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut output = self.output.lock().await;
        if self.closed.is_cancelled() {
            return Err(closed_error());
        }
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(closed_error()),
            result = async {
                output.write_all(frame).await?;
                output.flush().await
            } => result,
        }
    }

    /// Signal closure and shut the write side down.
    ///
    /// Safe to call concurrently with reads and writes and more than once;
    /// errors from an already broken socket are ignored.
    pub async fn close(&self) {
        self.closed.cancel();
        // A writer still holding the lock will bail out on the token; the
        // socket is released when the last handle drops either way.
        let Ok(mut output) = self.output.try_lock() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, output.get_mut().shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(epoch = self.epoch, error = %e, "Ignoring shutdown error"),
            Err(_) => debug!(epoch = self.epoch, "Socket shutdown timed out"),
        }
    }
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("epoch", &self.epoch)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "relay session closed")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn write_frame_flushes_to_peer() {
        let (near, mut far) = tokio::io::duplex(64);
        let (session, _input) = RelaySession::new(near);

        session.write_frame(b"SEND\n\nhi\0").await.unwrap();

        let mut buf = [0u8; 9];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"SEND\n\nhi\0");
    }

    #[tokio::test]
    async fn epochs_are_unique() {
        let (a, _) = tokio::io::duplex(8);
        let (b, _) = tokio::io::duplex(8);
        let (first, _in1) = RelaySession::new(a);
        let (second, _in2) = RelaySession::new(b);
        assert_ne!(first.epoch(), second.epoch());
    }

    #[tokio::test]
    async fn writes_after_close_fail_with_broken_pipe() {
        let (near, _far) = tokio::io::duplex(64);
        let (session, _input) = RelaySession::new(near);

        session.close().await;
        session.close().await;

        assert!(session.is_closed());
        let err = session.write_frame(b"x").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn close_unblocks_a_stalled_write() {
        // Peer never reads and the pipe holds 4 bytes, so the write blocks.
        let (near, _far) = tokio::io::duplex(4);
        let (session, _input) = RelaySession::new(near);
        let session = std::sync::Arc::new(session);

        let writer = {
            let session = std::sync::Arc::clone(&session);
            tokio::spawn(async move { session.write_frame(&[b'a'; 64 * 1024]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.close().await;

        let result = tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }
}
