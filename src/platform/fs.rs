// PftLens - platform/fs.rs
//
// Bounded reads of input documents from files or stdin.

use crate::util::error::InputError;
use std::io::Read;
use std::path::Path;

/// Read a UTF-8 text file, refusing files larger than `max_size` bytes.
///
/// The size is checked from metadata before reading so an oversized file is
/// never loaded.
pub fn read_capped(path: &Path, max_size: u64) -> Result<String, InputError> {
    let metadata = std::fs::metadata(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > max_size {
        return Err(InputError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size,
        });
    }

    std::fs::read_to_string(path).map_err(|e| InputError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read stdin to a string, refusing more than `max_size` bytes.
pub fn read_stdin_capped(max_size: u64) -> Result<String, InputError> {
    read_reader_capped(std::io::stdin().lock(), Path::new("<stdin>"), max_size)
}

fn read_reader_capped<R: Read>(
    reader: R,
    label: &Path,
    max_size: u64,
) -> Result<String, InputError> {
    let mut text = String::new();
    // One byte past the limit distinguishes "exactly max" from "too large".
    reader
        .take(max_size + 1)
        .read_to_string(&mut text)
        .map_err(|e| InputError::Io {
            path: label.to_path_buf(),
            source: e,
        })?;

    if text.len() as u64 > max_size {
        return Err(InputError::TooLarge {
            path: label.to_path_buf(),
            size: text.len() as u64,
            max_size,
        });
    }
    Ok(text)
}
