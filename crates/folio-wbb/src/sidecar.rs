//! The versioned binary sidecar: header, records, page markers.

use crate::error::WbbError;
use crate::record::WordBox;
use std::path::Path;
use tracing::debug;

const MAGIC: &[u8; 10] = b"UpLib:wbb:";

/// Length of the file header in bytes.
pub const HEADER_LEN: usize = 12;

/// On-disk record layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    /// 24-byte records without baseline or rotation.
    V1,
    /// 28-byte records with baseline and rotation.
    #[default]
    V2,
}

impl Version {
    pub fn record_len(self) -> usize {
        match self {
            Version::V1 => 24,
            Version::V2 => 28,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Version::V1 => 1,
            Version::V2 => 2,
        }
    }

    pub fn from_number(n: u8) -> Result<Self, WbbError> {
        match n {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2),
            other => Err(WbbError::UnsupportedVersion(other)),
        }
    }

    fn header(self) -> [u8; HEADER_LEN] {
        let mut h = [0u8; HEADER_LEN];
        h[..10].copy_from_slice(MAGIC);
        h[10] = b'0' + self.number();
        h
    }
}

/// A decoded sidecar: word boxes grouped by page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sidecar {
    pub version: Version,
    pub pages: Vec<Vec<WordBox>>,
}

impl Sidecar {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            pages: Vec::new(),
        }
    }

    /// Total number of word records, page markers excluded.
    pub fn word_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Encode header, records and page markers.
    pub fn encode(&self) -> Vec<u8> {
        let record_len = self.version.record_len();
        let v2 = self.version == Version::V2;
        let mut out =
            Vec::with_capacity(HEADER_LEN + (self.word_count() + self.pages.len()) * record_len);
        out.extend_from_slice(&self.version.header());
        for (i, page) in self.pages.iter().enumerate() {
            if i > 0 {
                out.resize(out.len() + record_len, 0);
            }
            for b in page {
                b.write_record(v2, &mut out);
            }
        }
        out
    }

    /// Decode a complete sidecar file image.
    pub fn decode(bytes: &[u8]) -> Result<Self, WbbError> {
        if bytes.len() < HEADER_LEN || &bytes[..10] != MAGIC || bytes[11] != 0 {
            return Err(WbbError::BadHeader {
                found: bytes[..bytes.len().min(HEADER_LEN)].to_vec(),
            });
        }
        let digit = bytes[10];
        if !digit.is_ascii_digit() {
            return Err(WbbError::BadHeader {
                found: bytes[..HEADER_LEN].to_vec(),
            });
        }
        let version = Version::from_number(digit - b'0')?;
        let record_len = version.record_len();
        let body = &bytes[HEADER_LEN..];
        if body.len() % record_len != 0 {
            return Err(WbbError::Truncated {
                trailing: body.len() % record_len,
                record_len,
            });
        }

        let mut pages: Vec<Vec<WordBox>> = Vec::new();
        if !body.is_empty() {
            pages.push(Vec::new());
        }
        let v2 = version == Version::V2;
        for chunk in body.chunks_exact(record_len) {
            if chunk.iter().all(|&b| b == 0) {
                pages.push(Vec::new());
                continue;
            }
            if let Some(page) = pages.last_mut() {
                page.push(WordBox::read_record(v2, chunk));
            }
        }
        debug!(
            "decoded wordbboxes v{}: {} pages, {} words",
            version.number(),
            pages.len(),
            pages.iter().map(Vec::len).sum::<usize>()
        );
        Ok(Self { version, pages })
    }

    pub fn read(path: &Path) -> Result<Self, WbbError> {
        let bytes = std::fs::read(path).map_err(|e| WbbError::io(path, e))?;
        Self::decode(&bytes)
    }

    pub fn write(&self, path: &Path) -> Result<(), WbbError> {
        std::fs::write(path, self.encode()).map_err(|e| WbbError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WordFlags;

    fn word(left: f32, offset: u32, flags: WordFlags) -> WordBox {
        WordBox {
            left,
            top: 100.0,
            right: left + 30.5,
            bottom: 112.25,
            baseline: 110.0,
            char_count: 5,
            font_type: 3,
            rotation: 1,
            font_size: 11.5,
            flags,
            offset,
        }
    }

    #[test]
    fn v2_round_trip_with_page_markers() {
        let pages = vec![
            vec![
                word(72.0, 0, WordFlags::ENDS_WORD),
                word(110.0, 6, WordFlags::ENDS_LINE | WordFlags::BOLD),
            ],
            vec![],
            vec![word(72.0, 14, WordFlags::ITALIC | WordFlags::HAS_HYPHEN | WordFlags::ENDS_LINE)],
        ];
        let sidecar = Sidecar {
            version: Version::V2,
            pages,
        };
        let bytes = sidecar.encode();
        // 3 words + 2 page markers
        assert_eq!(bytes.len(), HEADER_LEN + 5 * 28);
        assert_eq!(&bytes[..12], b"UpLib:wbb:2\0");

        let back = Sidecar::decode(&bytes).unwrap();
        assert_eq!(back, sidecar);
    }

    #[test]
    fn unknown_version_is_named() {
        let mut bytes = b"UpLib:wbb:3\0".to_vec();
        bytes.extend_from_slice(&[0u8; 28]);
        match Sidecar::decode(&bytes) {
            Err(WbbError::UnsupportedVersion(3)) => {}
            other => panic!("expected UnsupportedVersion(3), got {other:?}"),
        }
    }

    #[test]
    fn bad_header_rejected() {
        assert!(matches!(
            Sidecar::decode(b"not a sidecar"),
            Err(WbbError::BadHeader { .. })
        ));
        assert!(matches!(Sidecar::decode(b"UpL"), Err(WbbError::BadHeader { .. })));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = b"UpLib:wbb:1\0".to_vec();
        bytes.extend_from_slice(&[1u8; 30]);
        assert!(matches!(
            Sidecar::decode(&bytes),
            Err(WbbError::Truncated {
                trailing: 6,
                record_len: 24
            })
        ));
    }

    #[test]
    fn empty_body_has_no_pages() {
        let s = Sidecar::decode(b"UpLib:wbb:1\0").unwrap();
        assert_eq!(s.version, Version::V1);
        assert!(s.pages.is_empty());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wordbboxes");
        let sidecar = Sidecar {
            version: Version::V1,
            pages: vec![vec![WordBox {
                baseline: 112.25,
                rotation: 0,
                ..word(10.0, 0, WordFlags::ENDS_LINE)
            }]],
        };
        sidecar.write(&path).unwrap();
        assert_eq!(Sidecar::read(&path).unwrap(), sidecar);
    }
}
