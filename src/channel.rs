//! Memory channels: per-path growable byte buffers backing open file handles
//! (§3 Memory channel, §9 cyclic-lifetime design note).

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The buffered content of one open-or-recently-open file.
struct ChannelBuffer {
    bytes: Vec<u8>,
    modified: bool,
}

/// A per-path mutable byte buffer, shared by every open handle on that path.
///
/// The buffer itself is guarded by its own lock (the "buffer lock", §5),
/// distinct from the filesystem's single exclusive lock, so that raw
/// read/write/seek calls on a [`ByteChannelHandle`] don't need to hold the
/// whole filesystem lock for the duration of the I/O.
pub(crate) struct Channel {
    buffer: Mutex<ChannelBuffer>,
    attached: AtomicUsize,
}

impl Channel {
    pub(crate) fn new(bytes: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            buffer: Mutex::new(ChannelBuffer {
                bytes,
                modified: false,
            }),
            attached: AtomicUsize::new(0),
        })
    }

    /// Current content length under the buffer lock.
    pub(crate) fn len(&self) -> u64 {
        self.buffer.lock().expect("channel buffer lock poisoned").bytes.len() as u64
    }

    /// A snapshot of the current content.
    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().expect("channel buffer lock poisoned").bytes.clone()
    }

    /// Has this channel been written to since the last flush?
    pub(crate) fn is_modified(&self) -> bool {
        self.buffer.lock().expect("channel buffer lock poisoned").modified
    }

    /// Clear the modified flag after a successful flush to a blob.
    pub(crate) fn clear_modified(&self) {
        self.buffer.lock().expect("channel buffer lock poisoned").modified = false;
    }

    /// Force the modified flag, e.g. after a truncating open whose content
    /// diverges from the on-disk blob without any `write()` call yet.
    pub(crate) fn mark_modified(&self) {
        self.buffer.lock().expect("channel buffer lock poisoned").modified = true;
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.attached.load(Ordering::Acquire)
    }

    fn attach(&self) {
        self.attached.fetch_add(1, Ordering::AcqRel);
    }

    fn detach(&self) {
        self.attached.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A user-facing seekable handle onto an open file's memory channel.
///
/// Increments the owning channel's attached-handle-count on creation;
/// [`close`](Self::close) decrements it and is the point at which the
/// filesystem's garbage-collection-on-close rule (§3, §4.2 `newByteChannel`)
/// applies. Implements [`Read`]/[`Write`]/[`Seek`] directly against the
/// channel's buffer, independent of the filesystem lock.
pub struct ByteChannelHandle {
    pub(crate) channel: Arc<Channel>,
    position: u64,
    append: bool,
    closed: bool,
}

impl ByteChannelHandle {
    pub(crate) fn new(channel: Arc<Channel>, append: bool) -> Self {
        channel.attach();
        let position = if append { channel.len() } else { 0 };
        Self {
            channel,
            position,
            append,
            closed: false,
        }
    }

    /// Current buffer length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.channel.len()
    }

    /// Is the buffer empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach this handle from its channel. Idempotent. Callers normally rely
    /// on `Drop`; call explicitly to observe the channel become eligible for
    /// collection as soon as the filesystem's next operation runs.
    pub fn close(&mut self) {
        if !self.closed {
            self.channel.detach();
            self.closed = true;
        }
    }
}

impl Drop for ByteChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl Read for ByteChannelHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let data = self.channel.buffer.lock().expect("channel buffer lock poisoned");
        let pos = self.position as usize;
        if pos >= data.bytes.len() {
            return Ok(0);
        }
        let n = (data.bytes.len() - pos).min(buf.len());
        buf[..n].copy_from_slice(&data.bytes[pos..pos + n]);
        drop(data);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for ByteChannelHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut data = self.channel.buffer.lock().expect("channel buffer lock poisoned");
        let pos = if self.append {
            data.bytes.len()
        } else {
            self.position as usize
        };
        if pos + buf.len() > data.bytes.len() {
            data.bytes.resize(pos + buf.len(), 0);
        }
        data.bytes[pos..pos + buf.len()].copy_from_slice(buf);
        data.modified = true;
        drop(data);
        self.position = (pos + buf.len()) as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for ByteChannelHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let len = self.len();
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative position",
            ));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}
