//! Incremental assembly of streamed model responses.
//!
//! Bytes from the transport go through a [`StreamBuffer`] that yields complete
//! lines, a [`LineDecoder`] that turns each line into [`Fragment`]s, and a
//! [`ReconcilerState`] that decides what the terminal has to print. The same
//! pipeline serves the official SSE stream and the key-free endpoint; only
//! the decoder and the preamble handling differ.

mod buffer;
mod decoder;
mod path;
mod reconcile;
mod sink;

use std::io::{self, ErrorKind, Read};

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::GcliError;

pub use buffer::{StreamBuffer, XSSI_PREAMBLE};
pub use decoder::{Fragment, LineDecoder, Location, Signal, SseDecoder, TextMode, WebDecoder};
pub use path::{JsonPath, Step};
pub use reconcile::{reconcile, ReconcilerState, RenderAction, TurnPhase};
pub use sink::{Sink, TerminalSink};

const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("out of memory buffering stream ({requested} bytes requested, {retained} retained)")]
    Allocation { requested: usize, retained: usize },
    #[error("failed to write response: {0}")]
    Sink(#[from] io::Error),
}

/// Text that becomes the stored model message once the stream ends.
///
/// Owned by the caller. Every observation replaces the whole value with the
/// latest full text, so a restarted stream never duplicates content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalResponse(String);

impl FinalResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, text: &str) {
        self.0.clear();
        self.0.push_str(text);
    }

    pub fn push_str(&mut self, delta: &str) {
        self.0.push_str(delta);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Whether the transport should keep delivering bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// How a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Completed,
    /// The assembler asked to stop early; the caller decides if that is success.
    Aborted,
}

/// Which place details the key-free endpoint should be probed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationRequest {
    pub label: bool,
    pub map: bool,
}

impl LocationRequest {
    pub fn is_empty(&self) -> bool {
        !self.label && !self.map
    }
}

#[derive(Debug, Default)]
struct PlaceTracker {
    active: bool,
    wanted: LocationRequest,
    gathered: bool,
}

impl PlaceTracker {
    fn new(request: LocationRequest) -> Self {
        Self {
            active: !request.is_empty(),
            wanted: request,
            gathered: false,
        }
    }

    /// Next line to print for `place`, at most one item per line.
    fn take(&mut self, place: &Location) -> Option<String> {
        self.gathered = true;
        if self.wanted.label {
            let label = place.label.as_ref()?;
            self.wanted.label = false;
            Some(label.clone())
        } else if self.wanted.map {
            let map = place.map_path.as_ref()?;
            self.wanted.map = false;
            Some(format!("https:{map}"))
        } else {
            None
        }
    }

    fn satisfied(&self) -> bool {
        self.active && self.wanted.is_empty()
    }
}

/// Drives one request's stream from raw bytes to rendered output.
///
/// Created fresh for every attempt; nothing carries over between retries.
#[derive(Debug)]
pub struct StreamAssembler<D> {
    buffer: StreamBuffer,
    decoder: D,
    reconciler: ReconcilerState,
    pending_code: Option<String>,
    places: PlaceTracker,
}

impl<D: LineDecoder> StreamAssembler<D> {
    pub fn new(buffer: StreamBuffer, decoder: D) -> Self {
        Self {
            buffer,
            decoder,
            reconciler: ReconcilerState::new(),
            pending_code: None,
            places: PlaceTracker::default(),
        }
    }

    /// Feed one transport chunk. Returns [`Flow::Stop`] once every requested
    /// location item has been printed.
    pub fn feed<S: Sink + ?Sized>(
        &mut self,
        bytes: &[u8],
        sink: &mut S,
        response: &mut FinalResponse,
    ) -> Result<Flow, StreamError> {
        for raw in self.buffer.feed(bytes)? {
            let line = String::from_utf8_lossy(&raw);
            for fragment in self.decoder.decode(&line) {
                self.apply(fragment, sink, response)?;
            }
            if self.places.satisfied() {
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Close the turn after the transport finished. The stored text is
    /// whatever the caller's [`FinalResponse`] holds.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            debug!(bytes = self.buffer.pending().len(), "discarding unterminated trailing line");
        }
        self.reconciler.finalize();
    }

    /// Whether any place data arrived.
    pub fn location_gathered(&self) -> bool {
        self.places.gathered
    }

    pub fn reconciler(&self) -> &ReconcilerState {
        &self.reconciler
    }

    fn apply<S: Sink + ?Sized>(
        &mut self,
        fragment: Fragment,
        sink: &mut S,
        response: &mut FinalResponse,
    ) -> Result<(), StreamError> {
        match fragment {
            Fragment::Snapshot(text) => self.show(&text, sink, response)?,
            Fragment::Chunk(delta) => {
                // `response` already mirrors the last observation, so the delta
                // extends both without copying the whole message.
                let action = self.reconciler.observe_append(&delta);
                sink.render(&action)?;
                response.push_str(&delta);
            }
            Fragment::Code(code) => self.pending_code = Some(code),
            Fragment::Location(place) => {
                if let Some(line) = self.places.take(&place) {
                    sink.location(&line)?;
                }
            }
            Fragment::Control(Signal::EndOfBlock) => {
                if let Some(code) = self.pending_code.take() {
                    sink.code_block(&code)?;
                }
            }
            Fragment::Control(Signal::Malformed(reason)) => {
                warn!(%reason, "skipping malformed line in response stream");
            }
            Fragment::Control(Signal::Ignored) => {}
        }
        Ok(())
    }

    fn show<S: Sink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
        response: &mut FinalResponse,
    ) -> Result<(), StreamError> {
        let action = self.reconciler.observe(text);
        sink.render(&action)?;
        response.replace(text);
        Ok(())
    }
}

impl StreamAssembler<SseDecoder> {
    /// Assembler for the official `alt=sse` stream.
    pub fn sse(decoder: SseDecoder) -> Self {
        Self::new(StreamBuffer::new(), decoder)
    }
}

impl StreamAssembler<WebDecoder> {
    /// Assembler for the key-free endpoint; an empty request streams text.
    pub fn web(request: LocationRequest) -> Self {
        let decoder = if request.is_empty() {
            WebDecoder::new()
        } else {
            WebDecoder::with_locations()
        };
        let mut assembler = Self::new(StreamBuffer::with_preamble(XSSI_PREAMBLE), decoder);
        assembler.places = PlaceTracker::new(request);
        assembler
    }
}

/// Copy a response body into `assembler` until it ends or asks to stop.
pub fn pump<R, D, S>(
    mut reader: R,
    assembler: &mut StreamAssembler<D>,
    sink: &mut S,
    response: &mut FinalResponse,
) -> Result<Transfer, GcliError>
where
    R: Read,
    D: LineDecoder,
    S: Sink + ?Sized,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => return Err(GcliError::Io(error)),
        };
        if assembler.feed(&chunk[..read], sink, response)? == Flow::Stop {
            debug!("stream aborted after gathering location data");
            return Ok(Transfer::Aborted);
        }
    }
    assembler.finish();
    Ok(Transfer::Completed)
}
