use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::AudioFrame;
use crate::error::CaptureError;

/// PCM layout of an input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// One finalized slice of encoded audio produced by a flush
#[derive(Debug, Clone)]
pub struct Segment {
    /// Encoded bytes (standalone WAV file)
    pub payload: Vec<u8>,
    /// Audio duration covered by the segment
    pub duration: Duration,
    /// Number of interleaved PCM samples encoded
    pub sample_count: usize,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Live encoder bound to an input stream
///
/// Each `flush` finalizes the audio accumulated since `open` (or the previous
/// flush) into exactly one segment and starts a fresh buffer; no audio is
/// yielded twice.
pub trait SegmentEncoder: Send {
    fn flush(&mut self) -> Result<Segment, CaptureError>;

    /// Stop encoding and return the final segment, if any audio is pending
    fn close(self: Box<Self>) -> Result<Option<Segment>, CaptureError>;
}

#[derive(Debug, Default)]
struct StreamShared {
    format: Option<StreamFormat>,
    /// Pending samples of the attached encoder; `None` while no encoder is open
    tap: Option<Vec<i16>>,
    frames_received: u64,
    frames_discarded: u64,
}

/// A live input stream shared between the device pump and the active encoder
///
/// Frames pushed while no encoder is attached (e.g. while paused) are
/// discarded. At most one encoder can be attached at a time.
#[derive(Debug, Clone, Default)]
pub struct InputStream {
    shared: Arc<Mutex<StreamShared>>,
}

impl InputStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StreamShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a captured frame to the attached encoder
    pub fn push(&self, frame: &AudioFrame) {
        let mut shared = self.lock();
        shared.frames_received += 1;

        let format = StreamFormat {
            sample_rate: frame.sample_rate,
            channels: frame.channels,
        };

        match shared.format {
            None => shared.format = Some(format),
            Some(current) if current != format => {
                warn!(
                    "Frame format changed mid-stream ({}Hz/{}ch -> {}Hz/{}ch). Dropping frame.",
                    current.sample_rate, current.channels, format.sample_rate, format.channels
                );
                shared.frames_discarded += 1;
                return;
            }
            Some(_) => {}
        }

        match shared.tap.as_mut() {
            Some(pending) => pending.extend_from_slice(&frame.samples),
            None => shared.frames_discarded += 1,
        }
    }

    /// Format of the frames seen so far
    pub fn format(&self) -> Option<StreamFormat> {
        self.lock().format
    }

    /// Whether an encoder currently owns the pending buffer
    pub fn has_encoder(&self) -> bool {
        self.lock().tap.is_some()
    }

    /// Total frames received and frames discarded (no encoder or bad format)
    pub fn frame_counts(&self) -> (u64, u64) {
        let shared = self.lock();
        (shared.frames_received, shared.frames_discarded)
    }

    fn attach(&self) -> Result<(), CaptureError> {
        let mut shared = self.lock();
        if shared.tap.is_some() {
            return Err(CaptureError::Encoder(
                "an encoder is already attached to this input stream".to_string(),
            ));
        }
        shared.tap = Some(Vec::new());
        Ok(())
    }

    fn swap_pending(&self) -> Vec<i16> {
        let mut shared = self.lock();
        match shared.tap.as_mut() {
            Some(pending) => std::mem::take(pending),
            None => Vec::new(),
        }
    }

    fn detach(&self) -> Vec<i16> {
        self.lock().tap.take().unwrap_or_default()
    }
}

/// Segment encoder writing each segment as a standalone 16-bit PCM WAV file
pub struct WavSegmentEncoder {
    stream: InputStream,
    fallback_format: StreamFormat,
    segments_emitted: usize,
    attached: bool,
}

impl WavSegmentEncoder {
    /// Open an encoder on `stream`
    ///
    /// `fallback_format` is used when no frame has been seen yet.
    pub fn open(stream: &InputStream, fallback_format: StreamFormat) -> Result<Self, CaptureError> {
        stream.attach()?;
        debug!("Segment encoder opened");

        Ok(Self {
            stream: stream.clone(),
            fallback_format,
            segments_emitted: 0,
            attached: true,
        })
    }

    fn encode(&mut self, samples: Vec<i16>) -> Result<Segment, CaptureError> {
        let format = self.stream.format().unwrap_or(self.fallback_format);
        let segment = encode_wav(&samples, format)?;
        self.segments_emitted += 1;

        debug!(
            "Segment {} finalized: {:.1}s ({} samples, {} bytes)",
            self.segments_emitted,
            segment.duration.as_secs_f64(),
            segment.sample_count,
            segment.payload.len()
        );

        Ok(segment)
    }
}

impl SegmentEncoder for WavSegmentEncoder {
    fn flush(&mut self) -> Result<Segment, CaptureError> {
        let samples = self.stream.swap_pending();
        self.encode(samples)
    }

    fn close(mut self: Box<Self>) -> Result<Option<Segment>, CaptureError> {
        self.attached = false;
        let samples = self.stream.detach();
        if samples.is_empty() {
            return Ok(None);
        }
        self.encode(samples).map(Some)
    }
}

impl Drop for WavSegmentEncoder {
    fn drop(&mut self) {
        if self.attached {
            let discarded = self.stream.detach();
            if !discarded.is_empty() {
                warn!(
                    "Segment encoder dropped without close; discarding {} samples",
                    discarded.len()
                );
            }
        }
    }
}

/// Encode interleaved i16 samples into an in-memory WAV file
pub fn encode_wav(samples: &[i16], format: StreamFormat) -> Result<Segment, CaptureError> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut payload = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut payload), spec)
            .map_err(|e| CaptureError::Encoder(format!("Failed to create WAV writer: {}", e)))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::Encoder(format!("Failed to write sample to WAV: {}", e)))?;
        }

        writer
            .finalize()
            .map_err(|e| CaptureError::Encoder(format!("Failed to finalize WAV: {}", e)))?;
    }

    let per_second = format.sample_rate as f64 * format.channels.max(1) as f64;
    let duration = if per_second > 0.0 {
        Duration::from_secs_f64(samples.len() as f64 / per_second)
    } else {
        Duration::ZERO
    };

    Ok(Segment {
        payload,
        duration,
        sample_count: samples.len(),
    })
}
