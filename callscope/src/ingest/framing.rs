//! Newline-delimited JSON reassembly.
//!
//! A record may arrive split across transport fragments. Each chunk is split
//! on newlines; a piece that fails to parse is held and concatenated with
//! the next piece, and a piece that fails twice in a row is a fatal protocol
//! error. Except for records with extremely large stack traces, a record
//! splits into at most two pieces, so one round of concatenation suffices.
//!
//! Byte-oriented on purpose: a multi-byte UTF-8 sequence split across chunks
//! reassembles before any string decoding happens.

use crate::domain::ProtocolError;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct LineAssembler {
    held: Vec<u8>,
}

impl LineAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns the JSON records completed by it.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::FragmentReassembly`] when a held fragment still fails
    /// to parse after concatenation.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        let mut records = Vec::new();
        for piece in chunk.split(|&byte| byte == b'\n') {
            if piece.is_empty() {
                continue;
            }
            if self.held.is_empty() {
                match serde_json::from_slice(piece) {
                    Ok(value) => records.push(value),
                    Err(_) => self.held = piece.to_vec(),
                }
            } else {
                let mut candidate = std::mem::take(&mut self.held);
                candidate.extend_from_slice(piece);
                match serde_json::from_slice(&candidate) {
                    Ok(value) => records.push(value),
                    Err(_) => {
                        return Err(ProtocolError::FragmentReassembly(snippet(&candidate)));
                    }
                }
            }
        }
        Ok(records)
    }

    /// `true` when no partial fragment is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.held.is_empty()
    }
}

/// Bounded, lossy preview of offending bytes for error messages.
fn snippet(bytes: &[u8]) -> String {
    const LIMIT: usize = 160;
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= LIMIT {
        text.into_owned()
    } else {
        let mut cut = LIMIT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}
