//! Fixed-Length Writer Address Buffer
//!
//! The firmware file writers take their destination as an array of character
//! codes, zero padded to a fixed length.

use crate::error::ConfigurationError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of elements in a writer address buffer
pub const WRITER_PATH_LEN: usize = 300;

/// Destination path encoded for a firmware writer
#[derive(Clone, PartialEq, Eq)]
pub struct WriterPath([u32; WRITER_PATH_LEN]);

impl WriterPath {
    /// Encode a path as ASCII codes, zero padded
    pub fn encode(path: &Path) -> Result<Self, ConfigurationError> {
        let text = path.to_string_lossy();
        if !text.is_ascii() {
            return Err(ConfigurationError::NonAsciiPath(text.into_owned()));
        }
        if text.len() > WRITER_PATH_LEN {
            return Err(ConfigurationError::WriterPathTooLong {
                len: text.len(),
                max: WRITER_PATH_LEN,
            });
        }

        let mut codes = [0u32; WRITER_PATH_LEN];
        for (slot, byte) in codes.iter_mut().zip(text.bytes()) {
            *slot = byte as u32;
        }
        Ok(Self(codes))
    }

    /// Raw register contents
    pub fn codes(&self) -> &[u32; WRITER_PATH_LEN] {
        &self.0
    }

    /// Decode back into a path, stopping at the first zero
    pub fn to_path(&self) -> PathBuf {
        let text: String = self
            .0
            .iter()
            .take_while(|&&c| c != 0)
            .filter_map(|&c| char::from_u32(c))
            .collect();
        PathBuf::from(text)
    }
}

impl fmt::Debug for WriterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriterPath").field(&self.to_path()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_with_zeros() {
        let encoded = WriterPath::encode(Path::new("/data/1700000000.dat")).unwrap();
        assert_eq!(encoded.codes()[0], '/' as u32);
        assert_eq!(encoded.codes()[19], 't' as u32);
        assert!(encoded.codes()[20..].iter().all(|&c| c == 0));
        assert_eq!(encoded.to_path(), PathBuf::from("/data/1700000000.dat"));
    }

    #[test]
    fn test_path_too_long() {
        let long = format!("/{}", "a".repeat(WRITER_PATH_LEN));
        let err = WriterPath::encode(Path::new(&long)).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::WriterPathTooLong {
                len: WRITER_PATH_LEN + 1,
                max: WRITER_PATH_LEN
            }
        );
    }

    #[test]
    fn test_exact_length_fits() {
        let exact = "b".repeat(WRITER_PATH_LEN);
        let encoded = WriterPath::encode(Path::new(&exact)).unwrap();
        assert_eq!(encoded.codes()[WRITER_PATH_LEN - 1], 'b' as u32);
    }
}
