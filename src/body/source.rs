//! Upstream body sources.

use std::io::{self, Read};

/// Forward-only byte stream that must be closed once consumed.
pub trait UpstreamBody: Read + Send {
    /// Release the underlying resource. Called at most once by
    /// [`BodyReplay`](crate::body::BodyReplay).
    fn close(&mut self) -> io::Result<()>;
}

/// Adapts any reader whose resources are freed on drop.
#[derive(Debug)]
pub struct ReaderBody<R> {
    inner: R,
}

impl<R: Read + Send> ReaderBody<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Send> Read for ReaderBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Send> UpstreamBody for ReaderBody<R> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}
