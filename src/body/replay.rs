//! Replayable request body.
//!
//! # States
//! ```text
//! Streaming: reads go to upstream, bytes are mirrored into the buffer
//! Drained:   upstream closed + released, reads served from the buffer
//! Errored:   first upstream error cached, every call returns it
//! ```

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use thiserror::Error;

use crate::body::source::{ReaderBody, UpstreamBody};

/// Runs once, after upstream has been closed.
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

const DRAIN_CHUNK: usize = 8 * 1024;

/// Sticky upstream failure.
#[derive(Debug, Clone, Error)]
pub enum BodyError {
    #[error("failed to read request body: {0}")]
    Read(Arc<io::Error>),

    #[error("failed to close request body: {0}")]
    Close(Arc<io::Error>),
}

impl BodyError {
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            BodyError::Read(e) | BodyError::Close(e) => e.kind(),
        }
    }

    /// True if both values are the same cached error.
    pub fn same_as(&self, other: &BodyError) -> bool {
        match (self, other) {
            (BodyError::Read(a), BodyError::Read(b)) => Arc::ptr_eq(a, b),
            (BodyError::Close(a), BodyError::Close(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<BodyError> for io::Error {
    fn from(e: BodyError) -> Self {
        io::Error::new(e.kind(), e)
    }
}

enum Pull {
    Data(usize),
    Eof,
    Interrupted(io::Error),
}

/// Forward-only body that can be rewound after its first full drain.
pub struct BodyReplay {
    /// `Some` until upstream has been closed.
    upstream: Option<Box<dyn UpstreamBody>>,
    release: Option<ReleaseHook>,
    buffer: Vec<u8>,
    cursor: usize,
    drained: bool,
    /// Set by `close()`, cleared by `rewind()`.
    closed: bool,
    error: Option<BodyError>,
}

impl BodyReplay {
    /// Wrap an upstream body.
    pub fn new(upstream: Box<dyn UpstreamBody>) -> Self {
        Self {
            upstream: Some(upstream),
            release: None,
            buffer: Vec::new(),
            cursor: 0,
            drained: false,
            closed: false,
            error: None,
        }
    }

    /// Wrap any reader. Nothing to close beyond dropping it.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(Box::new(ReaderBody::new(reader)))
    }

    /// In-memory body. Already drained.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            upstream: None,
            release: None,
            buffer: bytes.into(),
            cursor: 0,
            drained: true,
            closed: false,
            error: None,
        }
    }

    /// Empty body.
    pub fn empty() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Run `hook` once upstream is closed.
    pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        if self.upstream.is_some() {
            self.release = Some(Box::new(hook));
        } else {
            // nothing left to release
            hook();
        }
        self
    }

    /// Reset the read cursor to the start of the buffered bytes.
    ///
    /// Drains whatever is left of upstream first, so the whole body is
    /// replayable. Never touches upstream once it has been drained.
    pub fn rewind(&mut self) -> Result<(), BodyError> {
        self.check()?;
        self.drain()?;
        self.cursor = 0;
        self.closed = false;
        Ok(())
    }

    /// Read the rest of upstream into the buffer. Does not move this body's
    /// read cursor. Blocks on upstream reads.
    pub fn fill(&mut self) -> Result<(), BodyError> {
        self.check()?;
        self.drain()
    }

    /// Independent reader over the whole body. Drains upstream if needed.
    /// Does not move this body's read cursor.
    pub fn snapshot(&mut self) -> Result<Cursor<Vec<u8>>, BodyError> {
        self.fill()?;
        Ok(Cursor::new(self.buffer.clone()))
    }

    /// Rewind and return the whole body as bytes.
    pub fn replay_bytes(&mut self) -> Result<Vec<u8>, BodyError> {
        self.rewind()?;
        self.cursor = self.buffer.len();
        Ok(self.buffer.clone())
    }

    /// Close upstream (draining it into the buffer first) and fire the
    /// release hook. Idempotent.
    pub fn close(&mut self) -> Result<(), BodyError> {
        if let Some(err) = &self.error {
            let err = err.clone();
            // the error is already cached; still free the resource
            self.finish_upstream_quietly();
            return Err(err);
        }
        self.drain()?;
        self.closed = true;
        Ok(())
    }

    /// Bytes buffered so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drained && self.buffer.is_empty()
    }

    /// Whether upstream has been read to its end.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// The cached upstream error, if any.
    pub fn error(&self) -> Option<&BodyError> {
        self.error.as_ref()
    }

    fn check(&self) -> Result<(), BodyError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn drain(&mut self) -> Result<(), BodyError> {
        let mut chunk = [0u8; DRAIN_CHUNK];
        while !self.drained {
            match self.pull(&mut chunk)? {
                Pull::Data(_) | Pull::Interrupted(_) => continue,
                Pull::Eof => break,
            }
        }
        Ok(())
    }

    /// One read from upstream, mirrored into the buffer.
    fn pull(&mut self, buf: &mut [u8]) -> Result<Pull, BodyError> {
        let Some(upstream) = self.upstream.as_mut() else {
            self.drained = true;
            return Ok(Pull::Eof);
        };

        match upstream.read(buf) {
            Ok(0) => {
                self.drained = true;
                self.finish_upstream()?;
                Ok(Pull::Eof)
            }
            Ok(n) => {
                self.buffer.extend_from_slice(&buf[..n]);
                Ok(Pull::Data(n))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(Pull::Interrupted(e)),
            Err(e) => {
                tracing::debug!(error = %e, buffered = self.buffer.len(), "Upstream body read failed");
                let err = BodyError::Read(Arc::new(e));
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn finish_upstream(&mut self) -> Result<(), BodyError> {
        let Some(mut upstream) = self.upstream.take() else {
            return Ok(());
        };
        let result = upstream.close();
        drop(upstream);
        if let Some(hook) = self.release.take() {
            hook();
        }
        if let Err(e) = result {
            tracing::debug!(error = %e, "Upstream body close failed");
            let err = BodyError::Close(Arc::new(e));
            self.error = Some(err.clone());
            return Err(err);
        }
        Ok(())
    }

    fn finish_upstream_quietly(&mut self) {
        if let Some(mut upstream) = self.upstream.take() {
            let _ = upstream.close();
        }
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Read for BodyReplay {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check()?;
        if buf.is_empty() || self.closed {
            return Ok(0);
        }
        if !self.drained {
            return match self.pull(buf)? {
                Pull::Data(n) => {
                    self.cursor = self.buffer.len();
                    Ok(n)
                }
                Pull::Eof => Ok(0),
                Pull::Interrupted(e) => Err(e),
            };
        }
        let remaining = &self.buffer[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }
}

impl Drop for BodyReplay {
    fn drop(&mut self) {
        self.finish_upstream_quietly();
    }
}

impl fmt::Debug for BodyReplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyReplay")
            .field("buffered", &self.buffer.len())
            .field("cursor", &self.cursor)
            .field("drained", &self.drained)
            .field("closed", &self.closed)
            .field("error", &self.error)
            .finish()
    }
}
