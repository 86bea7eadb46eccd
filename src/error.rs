// SPDX-License-Identifier: MPL-2.0
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Error {
    Io(String),
    Config(String),
    Open(OpenError),
    Seek(SeekError),
    Decode(String),
    Transcode(TranscodeError),
    /// A file could not be deleted because another handle still holds it,
    /// even after the bounded retry loop.
    ResourceLock { path: PathBuf, attempts: u32 },
    /// An operation that needs an open source was called without one.
    Closed,
}

/// Specific error types for opening a video source.
/// Callers use these to decide between retrying with another backend
/// and falling back to the original (non-proxy) file.
#[derive(Debug, Clone)]
pub enum OpenError {
    /// File does not exist or cannot be read
    NotFound(String),

    /// The decoding backend refused the file
    CannotOpen(String),

    /// File appears corrupted or has invalid data
    CorruptedFile,

    /// File exists but contains no video stream
    NoVideoStream,

    /// A specific decoder backend was requested but is not available,
    /// and the software fallback also failed
    UnsupportedBackend { requested: String },
}

impl OpenError {
    /// Attempts to parse a raw decoder error message into a specific
    /// `OpenError`. This is used to categorize errors from FFmpeg.
    pub fn from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        // I/O errors (file access issues)
        if msg_lower.contains("no such file")
            || (msg_lower.contains("not found") && !msg_lower.contains("decoder"))
            || msg_lower.contains("permission denied")
            || msg_lower.contains("i/o error")
        {
            return OpenError::NotFound(msg.to_string());
        }

        // No video stream
        if msg_lower.contains("no video stream") || msg_lower.contains("no video track") {
            return OpenError::NoVideoStream;
        }

        // Corrupted file
        if msg_lower.contains("corrupt")
            || msg_lower.contains("invalid data")
            || msg_lower.contains("malformed")
        {
            return OpenError::CorruptedFile;
        }

        OpenError::CannotOpen(msg.to_string())
    }
}

/// Specific error types for seek failures.
///
/// A clamped target is a success, not a `SeekError`; these only cover the
/// cases where the requested frame could not be produced at all.
#[derive(Debug, Clone)]
pub enum SeekError {
    /// The stream ended before the target frame could be decoded.
    /// `last_decoded` is the last frame index actually produced, if any.
    EndOfStream {
        target: u64,
        last_decoded: Option<u64>,
    },

    /// The decoder rejected the reposition request
    Rejected(String),
}

/// Specific error types for proxy transcoding.
/// Reported through the transcode job's finished signal.
#[derive(Debug, Clone)]
pub enum TranscodeError {
    /// Could not open the source stream for reading
    SourceUnreadable(String),

    /// No writer could be opened, even after the codec fallback ladder
    WriterUnavailable(String),

    /// Encoding a frame or writing a packet failed mid-run
    WriteFailed(String),

    /// The job was cancelled before completion
    Cancelled,
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::NotFound(msg) => write!(f, "File not found: {}", msg),
            OpenError::CannotOpen(msg) => write!(f, "Cannot open video: {}", msg),
            OpenError::CorruptedFile => write!(f, "Video file is corrupted"),
            OpenError::NoVideoStream => write!(f, "No video stream found"),
            OpenError::UnsupportedBackend { requested } => {
                write!(f, "Decoder backend unavailable: {}", requested)
            }
        }
    }
}

impl fmt::Display for SeekError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeekError::EndOfStream {
                target,
                last_decoded,
            } => match last_decoded {
                Some(last) => write!(
                    f,
                    "Stream ended at frame {} before reaching target {}",
                    last, target
                ),
                None => write!(f, "Stream ended before reaching target {}", target),
            },
            SeekError::Rejected(msg) => write!(f, "Seek rejected: {}", msg),
        }
    }
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscodeError::SourceUnreadable(msg) => {
                write!(f, "Transcode source unreadable: {}", msg)
            }
            TranscodeError::WriterUnavailable(msg) => {
                write!(f, "No proxy writer available: {}", msg)
            }
            TranscodeError::WriteFailed(msg) => write!(f, "Proxy write failed: {}", msg),
            TranscodeError::Cancelled => write!(f, "Transcode cancelled"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O Error: {}", e),
            Error::Config(e) => write!(f, "Config Error: {}", e),
            Error::Open(e) => write!(f, "Open Error: {}", e),
            Error::Seek(e) => write!(f, "Seek Error: {}", e),
            Error::Decode(e) => write!(f, "Decode Error: {}", e),
            Error::Transcode(e) => write!(f, "Transcode Error: {}", e),
            Error::ResourceLock { path, attempts } => write!(
                f,
                "Could not delete {} after {} attempts (file still locked)",
                path.display(),
                attempts
            ),
            Error::Closed => write!(f, "No video source is open"),
        }
    }
}

impl From<OpenError> for Error {
    fn from(err: OpenError) -> Self {
        Error::Open(err)
    }
}

impl From<SeekError> for Error {
    fn from(err: SeekError) -> Self {
        Error::Seek(err)
    }
}

impl From<TranscodeError> for Error {
    fn from(err: TranscodeError) -> Self {
        Error::Transcode(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
