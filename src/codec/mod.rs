// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame transports.
//!
//! A transport turns the byte stream of a connection into frames. Reads
//! happen on a single thread, writes may come from any thread.

use std::io::{self, Read, Write};

use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    frame::{Packet, RawPacket},
};

#[cfg(feature = "rtu")]
pub mod rtu;
#[cfg(feature = "tcp")]
pub mod tcp;

pub type BoxedInput = Box<dyn Read + Send>;
pub type BoxedOutput = Box<dyn Write + Send>;

/// Input stream of a transport.
pub type Input = MarkReader<BoxedInput>;

pub(crate) fn end_of_stream() -> Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "End of Stream").into()
}

/// A reader that can rewind to a marked position.
///
/// Once marked, every byte pulled from the inner reader is retained until
/// the next [`MarkReader::mark`], so [`MarkReader::reset`] can replay it.
#[derive(Debug)]
pub struct MarkReader<R> {
    inner: R,
    retained: Vec<u8>,
    pos: usize,
    marked: bool,
}

impl<R: Read> MarkReader<R> {
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            retained: Vec::new(),
            pos: 0,
            marked: false,
        }
    }

    /// Remember the current position and drop everything before it.
    pub fn mark(&mut self) {
        self.retained.drain(..self.pos);
        self.pos = 0;
        self.marked = true;
    }

    /// Rewind to the last mark.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Discard exactly `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let skipped = io::copy(&mut self.by_ref().take(count as u64), &mut io::sink())?;
        if skipped < count as u64 {
            return Err(end_of_stream());
        }
        Ok(())
    }

    /// Read into `buf` until at least `min` bytes arrived.
    ///
    /// Partial reads are repeated, an end of stream is an error.
    pub fn read_min(&mut self, buf: &mut [u8], min: usize) -> Result<usize> {
        debug_assert!(min <= buf.len());
        let mut count = 0;
        while count < min {
            match self.read(&mut buf[count..]) {
                Ok(0) => return Err(end_of_stream()),
                Ok(n) => count += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(count)
    }

    /// Bytes read ahead of the current position.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.retained.len() - self.pos
    }
}

impl<R: Read> Read for MarkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.retained.len() {
            let n = buf.len().min(self.retained.len() - self.pos);
            buf[..n].copy_from_slice(&self.retained[self.pos..self.pos + n]);
            self.pos += n;
            if !self.marked && self.pos == self.retained.len() {
                self.retained.clear();
                self.pos = 0;
            }
            return Ok(n);
        }
        let n = self.inner.read(buf)?;
        if self.marked {
            self.retained.extend_from_slice(&buf[..n]);
            self.pos += n;
        }
        Ok(n)
    }
}

/// The byte channels a transport reads from and writes to.
#[derive(Default)]
pub struct Stream {
    input: Mutex<Option<Input>>,
    output: Mutex<Option<BoxedOutput>>,
}

impl Stream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both channels.
    pub fn attach(&self, input: BoxedInput, output: BoxedOutput) {
        *self.output.lock() = Some(output);
        *self.input.lock() = Some(MarkReader::new(input));
    }

    /// Drop both channels.
    pub fn detach(&self) {
        self.output.lock().take();
        self.input.lock().take();
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.output.lock().is_some()
    }

    /// Run `f` with exclusive access to the input.
    pub fn read_with<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Input) -> Result<T>,
    {
        let mut input = self.input.lock();
        let input = input.as_mut().ok_or(Error::NotConnected)?;
        f(input)
    }

    /// Write and flush `bytes` as one unit.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut output = self.output.lock();
        let output = output.as_mut().ok_or(Error::NotConnected)?;
        output.write_all(bytes)?;
        output.flush()?;
        trace!("Sent {} byte(s): {bytes:02X?}", bytes.len());
        Ok(())
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Reads and writes whole frames over a [`Stream`].
pub trait Transport: Send + Sync + 'static {
    type Frame: Packet;

    fn stream(&self) -> &Stream;

    /// Attach freshly opened channels.
    fn initialize(&self, input: BoxedInput, output: BoxedOutput) {
        self.stream().attach(input, output);
    }

    /// Block until one complete frame has been read.
    ///
    /// Protocol errors leave the stream at the next frame boundary. After an
    /// I/O error, other than a read timeout, the stream position is undefined.
    fn read(&self) -> Result<Self::Frame>;

    fn write(&self, frame: &Self::Frame) -> Result<()> {
        self.stream().write(frame.rawdata())
    }
}

/// Reads a frame with `read_frame`, rewinding to the frame start if the
/// read timed out so that the next attempt sees the same bytes.
pub(crate) fn read_framed<T, F>(stream: &Stream, read_frame: F) -> Result<T>
where
    F: FnOnce(&mut Input) -> Result<T>,
{
    stream.read_with(|input| {
        input.mark();
        let result = read_frame(input);
        if matches!(&result, Err(err) if err.is_idle()) {
            input.reset();
        }
        result
    })
}

/// Passes on whatever a single read delivers, without framing.
#[derive(Debug)]
pub struct BufferedTransport {
    stream: Stream,
    chunk_len: usize,
}

impl BufferedTransport {
    pub const DEFAULT_CHUNK_LEN: usize = 1024;

    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_len(Self::DEFAULT_CHUNK_LEN)
    }

    #[must_use]
    pub fn with_chunk_len(chunk_len: usize) -> Self {
        Self {
            stream: Stream::new(),
            chunk_len: chunk_len.max(1),
        }
    }
}

impl Default for BufferedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for BufferedTransport {
    type Frame = RawPacket;

    fn stream(&self) -> &Stream {
        &self.stream
    }

    fn read(&self) -> Result<RawPacket> {
        let mut buf = vec![0; self.chunk_len];
        let count = self.stream.read_with(|input| input.read_min(&mut buf, 1))?;
        buf.truncate(count);
        trace!("Received {count} byte(s): {buf:02X?}");
        Ok(RawPacket::new(buf))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::Arc,
    };

    use parking_lot::Mutex;

    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Hands out one scripted chunk per read, then end of stream.
    pub(crate) struct ChunkedReader {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ChunkedReader {
        pub(crate) fn new<I>(chunks: I) -> Self
        where
            I: IntoIterator<Item = Vec<u8>>,
        {
            Self {
                chunks: chunks.into_iter().map(Ok).collect(),
            }
        }

        pub(crate) fn then_error(mut self, kind: io::ErrorKind) -> Self {
            self.chunks.push_back(Err(kind.into()));
            self
        }

        pub(crate) fn then(mut self, chunk: Vec<u8>) -> Self {
            self.chunks.push_back(Ok(chunk));
            self
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let mut chunk = chunk?;
            let n = buf.len().min(chunk.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(Ok(chunk.split_off(n)));
            }
            Ok(n)
        }
    }

    /// Collects everything written to it.
    #[derive(Clone, Default)]
    pub(crate) struct SharedWriter(pub(crate) Arc<Mutex<Vec<u8>>>);

    impl Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
