//! Container detection from fixed-offset magic bytes.

use serde::Serialize;

/// Audio containers the decode step knows how to dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Flac,
    Mp3,
    Wav,
    Vorbis,
}

impl ContainerFormat {
    /// Extension handed to the probe as a hint.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Flac => "flac",
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Wav => "wav",
            ContainerFormat::Vorbis => "ogg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ContainerFormat::Flac => "audio/flac",
            ContainerFormat::Mp3 => "audio/mp3",
            ContainerFormat::Wav => "audio/wav",
            ContainerFormat::Vorbis => "audio/vorbis",
        }
    }
}

/// `(offset, expected bytes)` pairs that must all match, evaluated in table order.
const SIGNATURES: &[(ContainerFormat, &[(usize, &[u8])])] = &[
    (ContainerFormat::Flac, &[(0, b"fLaC")]),
    (ContainerFormat::Mp3, &[(0, b"ID")]),
    (ContainerFormat::Wav, &[(0, b"RIFF"), (8, b"WAVE")]),
    (ContainerFormat::Vorbis, &[(29, b"vorbis")]),
];

/// Classify `data` by its leading bytes. `None` when nothing matches.
pub fn detect_container(data: &[u8]) -> Option<ContainerFormat> {
    SIGNATURES
        .iter()
        .find(|(_, checks)| {
            checks.iter().all(|(offset, magic)| {
                data.get(*offset..offset + magic.len()) == Some(*magic)
            })
        })
        .map(|(format, _)| *format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(prefix: &[u8], len: usize) -> Vec<u8> {
        let mut v = prefix.to_vec();
        v.resize(len, 0);
        v
    }

    #[test]
    fn flac_magic() {
        let data = padded(&[102, 76, 97, 67], 64);
        assert_eq!(detect_container(&data), Some(ContainerFormat::Flac));
    }

    #[test]
    fn id3_tag_is_mp3() {
        let data = padded(b"ID3\x04", 64);
        assert_eq!(detect_container(&data), Some(ContainerFormat::Mp3));
    }

    #[test]
    fn riff_wave_is_wav() {
        let mut data = padded(&[82, 73, 70, 70], 64);
        data[8..12].copy_from_slice(b"WAVE");
        assert_eq!(detect_container(&data), Some(ContainerFormat::Wav));
    }

    #[test]
    fn riff_without_wave_is_unknown() {
        let mut data = padded(b"RIFF", 64);
        data[8..12].copy_from_slice(b"AVI ");
        assert_eq!(detect_container(&data), None);
    }

    #[test]
    fn vorbis_identification_header() {
        let mut data = padded(b"OggS", 64);
        data[29..35].copy_from_slice(b"vorbis");
        assert_eq!(detect_container(&data), Some(ContainerFormat::Vorbis));
    }

    #[test]
    fn short_or_unknown_buffers() {
        assert_eq!(detect_container(&[]), None);
        assert_eq!(detect_container(b"fLa"), None);
        assert_eq!(detect_container(&padded(b"MThd", 64)), None);
    }

    #[test]
    fn extension_hints() {
        assert_eq!(ContainerFormat::Vorbis.extension(), "ogg");
        assert_eq!(ContainerFormat::Wav.mime(), "audio/wav");
    }
}
