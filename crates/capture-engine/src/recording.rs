//! Recording handoff
//!
//! A device opened with a recording target forwards every captured frame to
//! a [`MovieSink`] created by the engine's [`MovieWriter`] at stream start.
//! The bundled [`RawFileWriter`] dumps frames back to back into one file and
//! describes them in a JSON sidecar.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, SinkError};

const CODEC_TYPE_MARKER: &str = ":CodecType=";
const CODEC_SETTINGS_MARKER: &str = ":CodecSettings=";

/// Recording flag bits passed at open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingFlags(u32);

impl RecordingFlags {
    /// Record sound too. Not supported, cleared at open.
    pub const AUDIO: u32 = 2;
    /// Record without delivering frames to the consumer
    pub const NO_LIVE_DELIVERY: u32 = 4;
    /// Capture on a dedicated acquisition thread
    pub const ASYNC_THREAD: u32 = 16;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    pub fn without(self, bit: u32) -> Self {
        Self(self.0 & !bit)
    }

    pub fn is_async(self) -> bool {
        self.contains(Self::ASYNC_THREAD)
    }

    pub fn delivers_live(self) -> bool {
        !self.contains(Self::NO_LIVE_DELIVERY)
    }
}

/// Encoder selection carried by a recording target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecSpec {
    /// Writer's default encoder
    Default,
    /// Encoder named by type
    Type(String),
    /// Full encoder settings string
    Settings(String),
}

impl fmt::Display for CodecSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "DEFAULTenc"),
            Self::Type(name) => write!(f, "type {}", name),
            Self::Settings(settings) => write!(f, "settings {}", settings),
        }
    }
}

/// Movie file name plus codec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingTarget {
    pub path: PathBuf,
    pub codec: CodecSpec,
}

impl RecordingTarget {
    /// Parse `file[:CodecType=name][:CodecSettings=spec]`. Settings win
    /// over a codec type when both are given.
    pub fn parse(spec: &str) -> Result<Self, CaptureError> {
        let settings_at = spec.find(CODEC_SETTINGS_MARKER);
        let type_at = spec.find(CODEC_TYPE_MARKER);

        let codec = if let Some(pos) = settings_at {
            let value = &spec[pos + CODEC_SETTINGS_MARKER.len()..];
            if value.is_empty() {
                return Err(CaptureError::Recording(
                    "empty codec settings".to_string(),
                ));
            }
            CodecSpec::Settings(value.to_string())
        } else if let Some(pos) = type_at {
            let value = &spec[pos + CODEC_TYPE_MARKER.len()..];
            if value.is_empty() {
                return Err(CaptureError::Recording("empty codec type".to_string()));
            }
            CodecSpec::Type(value.to_string())
        } else {
            CodecSpec::Default
        };

        let path_end = [settings_at, type_at]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(spec.len());
        let path = spec[..path_end].trim();
        if path.is_empty() {
            return Err(CaptureError::Recording(format!(
                "no movie file name in '{}'",
                spec
            )));
        }

        Ok(Self {
            path: PathBuf::from(path),
            codec,
        })
    }

    /// Point the target at a new file. Codec suffixes are not allowed here
    /// and are stripped; returns true if anything was stripped.
    pub fn retarget(&mut self, name: &str) -> bool {
        let end = [name.find(CODEC_SETTINGS_MARKER), name.find(CODEC_TYPE_MARKER)]
            .into_iter()
            .flatten()
            .min();
        let stripped = end.is_some();
        if stripped {
            warn!(
                "Codec settings can't be changed with a new movie name, ignoring suffix of '{}'",
                name
            );
        }
        self.path = PathBuf::from(&name[..end.unwrap_or(name.len())]);
        stripped
    }
}

impl FromStr for RecordingTarget {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Frame layout agreed between the engine and a movie sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkFormat {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    /// 8, or 16 for deeper sensors
    pub bits_per_channel: u32,
}

impl SinkFormat {
    /// Bytes of one frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.channels as usize
            * (self.bits_per_channel as usize).div_ceil(8)
    }

    /// A frame fits if channels, depth and width agree and it is not
    /// taller than the movie
    pub fn accepts(&self, frame: &SinkFormat) -> bool {
        self.channels == frame.channels
            && self.bits_per_channel == frame.bits_per_channel
            && self.width == frame.width
            && frame.height <= self.height
    }
}

/// Receives the frames of one recording
pub trait MovieSink: Send {
    fn format(&self) -> SinkFormat;

    /// Append one frame of `frame` layout; 16-bit samples are MSB aligned
    fn push(&mut self, frame: &SinkFormat, pixels: &[u8]) -> Result<(), SinkError>;

    /// Flush and close the movie. Returns the number of frames written.
    fn finish(&mut self) -> Result<u64, SinkError>;
}

/// Opens movie sinks
pub trait MovieWriter: Send + Sync {
    fn create(
        &self,
        target: &RecordingTarget,
        format: SinkFormat,
        fps: f64,
    ) -> Result<Box<dyn MovieSink>, SinkError>;
}

/// Writer producing raw frame dumps
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFileWriter;

impl MovieWriter for RawFileWriter {
    fn create(
        &self,
        target: &RecordingTarget,
        format: SinkFormat,
        fps: f64,
    ) -> Result<Box<dyn MovieSink>, SinkError> {
        if target.codec != CodecSpec::Default {
            debug!("Raw writer ignores codec {}", target.codec);
        }
        let file = File::create(&target.path)?;
        info!(
            "Recording {}x{} x{} @ {} bpc to {}",
            format.width,
            format.height,
            format.channels,
            format.bits_per_channel,
            target.path.display()
        );
        Ok(Box::new(RawMovieSink {
            path: target.path.clone(),
            out: Some(BufWriter::new(file)),
            format,
            fps,
            frames: 0,
        }))
    }
}

/// Sidecar written next to a raw dump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMovieHeader {
    pub format: SinkFormat,
    pub fps: f64,
    pub frames: u64,
}

impl RawMovieHeader {
    /// Sidecar file of a raw dump
    pub fn sidecar_path(movie: &Path) -> PathBuf {
        let mut name = movie.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    pub fn load(movie: &Path) -> Result<Self, SinkError> {
        let file = File::open(Self::sidecar_path(movie))?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Raw frames written back to back
pub struct RawMovieSink {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    format: SinkFormat,
    fps: f64,
    frames: u64,
}

impl MovieSink for RawMovieSink {
    fn format(&self) -> SinkFormat {
        self.format
    }

    fn push(&mut self, frame: &SinkFormat, pixels: &[u8]) -> Result<(), SinkError> {
        if !self.format.accepts(frame) {
            return Err(SinkError::FormatMismatch {
                expected: self.format,
                actual: *frame,
            });
        }
        let expected = frame.frame_bytes();
        if pixels.len() < expected {
            return Err(SinkError::ShortFrame {
                expected,
                actual: pixels.len(),
            });
        }
        let out = self.out.as_mut().ok_or(SinkError::Finished)?;
        out.write_all(&pixels[..expected])?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<u64, SinkError> {
        let mut out = self.out.take().ok_or(SinkError::Finished)?;
        out.flush()?;
        let header = RawMovieHeader {
            format: self.format,
            fps: self.fps,
            frames: self.frames,
        };
        let sidecar = File::create(RawMovieHeader::sidecar_path(&self.path))?;
        serde_json::to_writer_pretty(sidecar, &header)?;
        info!(
            "Movie {} finalized with {} frames",
            self.path.display(),
            self.frames
        );
        Ok(self.frames)
    }
}
