//! ISO/IEC 7816-4 padding: a `0x80` marker followed by NUL bytes.

use crate::error::DecryptError;

pub const PADDING_MARKER: u8 = 0x80;
/// `<min-query-len>` for UDP queries.
pub const MIN_QUERY_LEN: usize = 256;
pub const PADDING_BLOCK: usize = 64;

/// Pads `message` to at least `minimum` bytes and then to a multiple of `boundary`.
/// The marker byte is always present.
pub fn pad(message: &[u8], minimum: usize, boundary: usize) -> Vec<u8> {
    let target = padded_len(message.len(), minimum, boundary);
    let mut padded = Vec::with_capacity(target);
    padded.extend_from_slice(message);
    padded.push(PADDING_MARKER);
    padded.resize(target, 0);
    padded
}

pub fn padded_len(len: usize, minimum: usize, boundary: usize) -> usize {
    let marked_len = len + 1;
    if marked_len < minimum {
        minimum
    } else {
        marked_len.div_ceil(boundary) * boundary
    }
}

/// Removes trailing NULs and the marker; a missing marker is an error.
pub fn strip(padded: &[u8]) -> Result<&[u8], DecryptError> {
    let end = padded.iter().rposition(|b| *b != 0).ok_or(DecryptError::InvalidPadding)?;
    if padded[end] != PADDING_MARKER {
        return Err(DecryptError::InvalidPadding);
    }
    Ok(&padded[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_empty_message() {
        let padded = pad(&[], MIN_QUERY_LEN, PADDING_BLOCK);
        assert_eq!(padded.len(), 256);
        assert_eq!(padded[0], PADDING_MARKER);
        assert_eq!(strip(&padded).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_pad_one_byte() {
        let padded = pad(&[1], MIN_QUERY_LEN, PADDING_BLOCK);
        assert_eq!(padded.len(), 256);
        assert_eq!(padded[0], 1);
        assert_eq!(padded[1], PADDING_MARKER);
        assert_eq!(strip(&padded).unwrap(), &[1]);
    }

    #[test]
    fn test_pad_past_minimum_rounds_to_block() {
        let message: Vec<u8> = (0..256).map(|i| i as u8).collect();
        let padded = pad(&message, MIN_QUERY_LEN, PADDING_BLOCK);
        assert_eq!(padded.len(), 256 + 64);
        assert_eq!(padded[255], 255);
        assert_eq!(padded[256], PADDING_MARKER);
        assert_eq!(strip(&padded).unwrap(), message.as_slice());

        let message: Vec<u8> = (0..(256 + 63)).map(|i| i as u8).collect();
        let padded = pad(&message, MIN_QUERY_LEN, PADDING_BLOCK);
        assert_eq!(padded.len(), 256 + 64);
        assert_eq!(padded[256 + 63], PADDING_MARKER);
        assert_eq!(strip(&padded).unwrap(), message.as_slice());
    }

    #[test]
    fn test_message_ending_in_zero_survives() {
        let message = [5, 0, 0];
        let padded = pad(&message, MIN_QUERY_LEN, PADDING_BLOCK);
        assert_eq!(strip(&padded).unwrap(), &message);
    }

    #[test]
    fn test_strip_without_marker() {
        assert_eq!(strip(&[0u8; 64]), Err(DecryptError::InvalidPadding));
        assert_eq!(strip(&[1, 2, 3, 0, 0]), Err(DecryptError::InvalidPadding));
    }
}
