//! Streaming payloads.
//!
//! Read streams are pull-based: nothing is read ahead of the consumer
//! beyond one chunk. The mkfile sink is a bounded in-memory pipe drained by
//! a background writer, so a producer outrunning the disk is suspended on
//! `write` rather than buffered without limit.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;

use crate::error::{VfsError, VfsResult};
use crate::meta::Meta;

/// Lazy, single-pass byte sequence over a file's contents.
pub type ByteStream = BoxStream<'static, VfsResult<Bytes>>;

/// Lazy, single-pass sequence of directory entry descriptors.
pub type EntryStream = BoxStream<'static, VfsResult<Meta>>;

/// Content range served by a partial read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte served.
    pub start: u64,
    /// Last byte served (inclusive).
    pub end: u64,
    /// Full file size.
    pub total: u64,
}

impl ContentRange {
    /// Number of bytes served.
    pub fn len(&self) -> u64 {
        self.end + 1 - self.start
    }

    /// Always false; a served range holds at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Result of `readfile`.
pub struct FileRead {
    /// Descriptor of the file (full size, not the range length).
    pub meta: Meta,
    /// Set when only part of the file is streamed.
    pub range: Option<ContentRange>,
    /// The caller's etag matched; no body is attached.
    pub not_modified: bool,
    /// File contents, absent when `not_modified`.
    pub stream: Option<ByteStream>,
}

impl fmt::Debug for FileRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRead")
            .field("meta", &self.meta)
            .field("range", &self.range)
            .field("not_modified", &self.not_modified)
            .field("stream", &self.stream.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Result of `readdir`.
pub struct DirListing {
    /// Descriptor of the directory itself.
    pub meta: Meta,
    /// The caller's etag matched; no entries are attached.
    pub not_modified: bool,
    /// Child descriptors, absent when `not_modified`.
    pub stream: Option<EntryStream>,
}

impl fmt::Debug for DirListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirListing")
            .field("meta", &self.meta)
            .field("not_modified", &self.not_modified)
            .field("stream", &self.stream.as_ref().map(|_| "<stream>"))
            .finish()
    }
}

/// Result of `mkfile`.
#[derive(Debug)]
pub enum MkFile {
    /// The supplied source was drained and committed.
    Saved(Meta),
    /// No source was supplied; write into the sink and close it.
    Sink(FileSink),
}

impl MkFile {
    /// The sink, when one was handed out.
    pub fn into_sink(self) -> Option<FileSink> {
        match self {
            MkFile::Sink(sink) => Some(sink),
            MkFile::Saved(_) => None,
        }
    }
}

/// Notification that a sink's data has been written durably.
///
/// Resolves once, after the sink is closed and the backend has committed
/// every byte. Dropping it does not cancel the write.
#[derive(Debug)]
pub struct Saved {
    rx: oneshot::Receiver<VfsResult<Meta>>,
}

impl Future for Saved {
    type Output = VfsResult<Meta>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(VfsError::other("file writer stopped before saving"))))
    }
}

/// Writable end of a `mkfile` without a source.
///
/// Closing the sink (`shutdown`) marks end of data; [`Saved`] then fires
/// once the data is durable. Dropping the sink without closing also ends
/// the data, leaving whatever was written so far in the file.
pub struct FileSink {
    writer: DuplexStream,
    saved: Saved,
}

impl FileSink {
    pub(crate) fn new(writer: DuplexStream, rx: oneshot::Receiver<VfsResult<Meta>>) -> Self {
        Self {
            writer,
            saved: Saved { rx },
        }
    }

    /// Close the sink and wait until everything is saved.
    pub async fn finish(mut self) -> VfsResult<Meta> {
        // A failed shutdown means the writer already gave up; its error
        // arrives through `saved`.
        let _ = self.writer.shutdown().await;
        self.saved.await
    }

    /// Split into the raw writer and the saved notification.
    pub fn into_parts(self) -> (DuplexStream, Saved) {
        (self.writer, self.saved)
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink").finish_non_exhaustive()
    }
}

impl AsyncWrite for FileSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_len() {
        let range = ContentRange {
            start: 5,
            end: 9,
            total: 23,
        };
        assert_eq!(range.len(), 5);
    }

    #[tokio::test]
    async fn test_saved_reports_dropped_writer() {
        let (tx, rx) = oneshot::channel::<VfsResult<Meta>>();
        drop(tx);
        let err = Saved { rx }.await.unwrap_err();
        assert!(err.to_string().contains("stopped"));
    }
}
