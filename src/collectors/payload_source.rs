//! Payload sources and the collector thread that drains them
//!
//! A [`PayloadSource`] yields raw payloads one at a time. The
//! [`SourceCollector`] runs a source on its own thread and forwards every
//! payload to the ingestion loop, then signals the end of the stream.

use crate::error::SourceError;
use crate::runtime::LoopMessage;
use log::{debug, error, info};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Stdin};
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// A stream of opaque case report payloads
///
/// `Ok(None)` signals the end of the stream. An error also ends the stream;
/// the collector logs it and stops reading.
pub trait PayloadSource: Send {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Newline-delimited payloads from any buffered reader
///
/// Blank lines are skipped and line terminators (`\n` or `\r\n`) stripped.
pub struct LineSource<R: BufRead + Send> {
    reader: R,
    lines_read: u64,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lines_read: 0,
        }
    }

    /// Number of lines consumed so far, blank ones included
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

impl LineSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(std::io::stdin()))
    }
}

impl LineSource<BufReader<File>> {
    /// Read payloads from a file
    ///
    /// # Errors
    ///
    /// `SourceError::IoError` if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Send> PayloadSource for LineSource<R> {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        loop {
            let mut line = Vec::new();
            let read = self.reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                return Ok(None);
            }
            self.lines_read += 1;

            while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(line));
        }
    }
}

/// Payloads held in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySource {
    payloads: VecDeque<Vec<u8>>,
}

impl MemorySource {
    pub fn new<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        Self {
            payloads: payloads.into_iter().map(Into::into).collect(),
        }
    }
}

impl PayloadSource for MemorySource {
    fn next_payload(&mut self) -> Result<Option<Vec<u8>>, SourceError> {
        Ok(self.payloads.pop_front())
    }
}

/// Pumps a [`PayloadSource`] into the ingestion loop's channel on a background thread
///
/// End of stream and source errors are both forwarded as
/// [`LoopMessage::EndOfStream`] so the loop can shut down cleanly.
pub struct SourceCollector {
    source: Option<Box<dyn PayloadSource>>,
    output_channel: Sender<LoopMessage>,
    thread_handle: Option<JoinHandle<()>>,
    running: Arc<Mutex<bool>>,
}

impl SourceCollector {
    pub fn new(source: Box<dyn PayloadSource>, channel: Sender<LoopMessage>) -> Self {
        Self {
            source: Some(source),
            output_channel: channel,
            thread_handle: None,
            running: Arc::new(Mutex::new(false)),
        }
    }

    /// Start reading on a background thread
    ///
    /// A collector can only be started once; later calls do nothing.
    ///
    /// # Errors
    ///
    /// `SourceError::IoError` if the thread cannot be spawned.
    pub fn start(&mut self) -> Result<(), SourceError> {
        let source = match self.source.take() {
            Some(source) => source,
            None => return Ok(()),
        };
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = true;

        let channel = self.output_channel.clone();
        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new()
            .name("payload-source".to_string())
            .spawn(move || Self::collector_thread(source, channel, running));

        match spawned {
            Ok(handle) => {
                self.thread_handle = Some(handle);
                info!("Payload collector started");
                Ok(())
            }
            Err(e) => {
                *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;
                Err(SourceError::IoError(e))
            }
        }
    }

    /// Stop reading
    ///
    /// A thread blocked in a read (an idle stdin, for instance) cannot be
    /// interrupted; it is detached and exits with the process.
    pub fn stop(&mut self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = false;

        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Payload collector thread panicked");
                }
            } else {
                debug!("Payload collector is blocked on input, detaching it");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn collector_thread(
        mut source: Box<dyn PayloadSource>,
        channel: Sender<LoopMessage>,
        running: Arc<Mutex<bool>>,
    ) {
        let mut forwarded: u64 = 0;

        while *running.lock().unwrap_or_else(PoisonError::into_inner) {
            match source.next_payload() {
                Ok(Some(payload)) => {
                    if channel.send(LoopMessage::Payload(payload)).is_err() {
                        debug!("Ingestion loop has gone away, stopping payload collector");
                        break;
                    }
                    forwarded += 1;
                }
                Ok(None) => {
                    info!("Payload stream ended after {} payloads", forwarded);
                    Self::signal_end(&channel);
                    break;
                }
                Err(e) => {
                    error!("Payload source failed after {} payloads: {}", forwarded, e);
                    Self::signal_end(&channel);
                    break;
                }
            }
        }

        *running.lock().unwrap_or_else(PoisonError::into_inner) = false;
        debug!("Payload collector thread finished");
    }

    fn signal_end(channel: &Sender<LoopMessage>) {
        if let Err(e) = channel.send(LoopMessage::EndOfStream) {
            debug!("Ingestion loop has gone away, end of stream not delivered: {}", e);
        }
    }
}

impl Drop for SourceCollector {
    fn drop(&mut self) {
        self.stop();
    }
}
