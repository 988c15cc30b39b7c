//! Symphonia-backed demuxing and decoding.

mod codec;
mod demuxer;
mod mime;

pub use codec::{INPUT_SLOTS, OUTPUT_SLOTS, SymphoniaCodec};
pub use demuxer::SymphoniaDemuxer;
pub use mime::{MIME_ADPCM, MIME_RAW, MIME_UNKNOWN, is_decodable, mime_for_codec};
