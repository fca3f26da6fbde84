//! FFmpeg CLI helpers: probing, single-frame grabs, segment encoding and
//! encoder discovery.

mod encoders;
mod error;
mod frame;
mod probe;
mod segment;

pub use encoders::{EncoderInfo, EncoderKind, list_encoders, supported_mime_types};
pub use error::{MediaFfmpegError, Result};
pub use frame::{RgbaFrame, grab_frame_rgba};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_media};
pub use segment::{OutputFormat, SegmentRequest, extract_segment, segment_args};
