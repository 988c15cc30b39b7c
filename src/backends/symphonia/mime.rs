//! Mapping between symphonia codec types and the MIME types tracks are described with.

use symphonia::core::codecs::{
    CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP1, CODEC_TYPE_MP2,
    CODEC_TYPE_MP3, CODEC_TYPE_NULL, CODEC_TYPE_OPUS, CODEC_TYPE_VORBIS, CodecType,
};

pub const MIME_RAW: &str = "audio/raw";
pub const MIME_ADPCM: &str = "audio/adpcm";
pub const MIME_UNKNOWN: &str = "application/octet-stream";

const COMPRESSED: &[(CodecType, &str)] = &[
    (CODEC_TYPE_MP3, "audio/mpeg"),
    (CODEC_TYPE_MP2, "audio/mpeg-L2"),
    (CODEC_TYPE_MP1, "audio/mpeg-L1"),
    (CODEC_TYPE_AAC, "audio/mp4a-latm"),
    (CODEC_TYPE_FLAC, "audio/flac"),
    (CODEC_TYPE_VORBIS, "audio/vorbis"),
    (CODEC_TYPE_OPUS, "audio/opus"),
    (CODEC_TYPE_ALAC, "audio/alac"),
];

/// MIME type for a symphonia codec. PCM and ADPCM variants collapse to one MIME each.
pub fn mime_for_codec(codec: CodecType) -> &'static str {
    if codec == CODEC_TYPE_NULL {
        return MIME_UNKNOWN;
    }
    if let Some((_, mime)) = COMPRESSED.iter().find(|(ty, _)| *ty == codec) {
        return mime;
    }

    match symphonia::default::get_codecs().get_codec(codec) {
        Some(desc) if desc.short_name.starts_with("pcm_") => MIME_RAW,
        Some(desc) if desc.short_name.starts_with("adpcm_") => MIME_ADPCM,
        _ => MIME_UNKNOWN,
    }
}

/// Whether the default symphonia registry can decode tracks of this MIME type.
pub fn is_decodable(mime: &str) -> bool {
    if mime == MIME_RAW || mime == MIME_ADPCM {
        return true;
    }
    COMPRESSED
        .iter()
        .filter(|(_, m)| *m == mime)
        .any(|(codec, _)| symphonia::default::get_codecs().get_codec(*codec).is_some())
}
