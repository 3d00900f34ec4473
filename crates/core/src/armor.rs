//! ASCII-armor (PEM) block framing for caller-supplied key material.

use base64::Engine;

use crate::error::KeyError;

const BEGIN_PREFIX: &[u8] = b"-----BEGIN ";
const END_PREFIX: &[u8] = b"-----END ";
const BOUNDARY_SUFFIX: &[u8] = b"-----";

/// One `-----BEGIN <LABEL>----- ... -----END <LABEL>-----` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmorBlock<'a> {
    pub label: &'a str,
    body: &'a [u8],
}

impl ArmorBlock<'_> {
    /// Decode the base64 body into DER bytes.
    pub fn decode(&self) -> Result<Vec<u8>, KeyError> {
        let body = std::str::from_utf8(self.body)
            .map_err(|_| KeyError::MalformedArmor("block body is not valid UTF-8".to_owned()))?;

        if body.lines().any(|line| line.contains(':')) {
            return Err(KeyError::MalformedArmor(
                "encapsulated headers are not supported".to_owned(),
            ));
        }

        // Remove all whitespace (newlines, spaces) before decoding
        let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(KeyError::MalformedArmor(format!(
                "empty {} block",
                self.label
            )));
        }

        base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|e| KeyError::MalformedArmor(format!("invalid base64 in {}: {e}", self.label)))
    }
}

/// Find all armor blocks in `data`, in the order they appear.
///
/// Text outside of blocks is ignored.
#[tracing::instrument(skip(data), fields(data_len = data.len()))]
pub fn find_blocks(data: &[u8]) -> Result<Vec<ArmorBlock<'_>>, KeyError> {
    let mut blocks = Vec::new();
    let mut i = 0;

    while let Some(begin) = find_subslice(data, BEGIN_PREFIX, i) {
        let label_start = begin + BEGIN_PREFIX.len();
        let label_end = find_subslice(data, BOUNDARY_SUFFIX, label_start)
            .ok_or_else(|| KeyError::MalformedArmor("unterminated BEGIN line".to_owned()))?;
        let label = std::str::from_utf8(&data[label_start..label_end])
            .map_err(|_| KeyError::MalformedArmor("label is not valid UTF-8".to_owned()))?;
        if label.contains('\n') {
            return Err(KeyError::MalformedArmor("unterminated BEGIN line".to_owned()));
        }

        let body_start = label_end + BOUNDARY_SUFFIX.len();
        let end = find_subslice(data, END_PREFIX, body_start)
            .ok_or_else(|| KeyError::MalformedArmor(format!("missing END line for {label}")))?;
        let end_label_start = end + END_PREFIX.len();
        let end_label_end = find_subslice(data, BOUNDARY_SUFFIX, end_label_start)
            .ok_or_else(|| KeyError::MalformedArmor("unterminated END line".to_owned()))?;
        let end_label = &data[end_label_start..end_label_end];
        if end_label != label.as_bytes() {
            return Err(KeyError::MalformedArmor(format!(
                "END label `{}` does not match BEGIN label `{label}`",
                String::from_utf8_lossy(end_label)
            )));
        }

        blocks.push(ArmorBlock {
            label,
            body: &data[body_start..end],
        });
        i = end_label_end + BOUNDARY_SUFFIX.len();
    }

    Ok(blocks)
}

fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}
