//! Reassembly of backend frames from arbitrarily chunked socket reads.

use std::collections::VecDeque;

use crate::error::Result;
use crate::protocol::codec::Frame;

/// Queue of raw socket chunks that yields complete frames.
///
/// A frame may start in one chunk and end several chunks later; an
/// incomplete head chunk is merged with its successor until the frame fits.
#[derive(Debug, Default)]
pub struct Reassembler {
    chunks: VecDeque<Vec<u8>>,
    /// Bytes of the front chunk already consumed
    offset: usize,
}

impl Reassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one chunk as read from the socket.
    pub fn push(&mut self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk.to_vec());
        }
    }

    /// Number of buffered bytes not yet returned as frames.
    pub fn buffered(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum::<usize>() - self.offset
    }

    /// Extract the next complete frame, or `Ok(None)` if more data is needed.
    ///
    /// A malformed length field is returned as an error; the stream cannot be
    /// trusted afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(first) = self.chunks.front_mut() else {
                return Ok(None);
            };

            if let Some((frame, used)) = Frame::decode(&first[self.offset..])? {
                self.offset += used;
                if self.offset == first.len() {
                    self.chunks.pop_front();
                    self.offset = 0;
                }
                return Ok(Some(frame));
            }

            if self.chunks.len() < 2 {
                return Ok(None);
            }
            self.merge_front();
        }
    }

    /// Fold the second chunk into the first, dropping consumed bytes.
    fn merge_front(&mut self) {
        let Some(next) = self.chunks.remove(1) else {
            return;
        };
        if let Some(first) = self.chunks.front_mut() {
            first.drain(..self.offset);
            first.extend_from_slice(&next);
        }
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::backend::{Event, parse_response};
    use crate::protocol::types::TransactionStatus;

    fn encode(events: &[Event]) -> Vec<u8> {
        let mut wire = Vec::new();
        for event in events {
            event.write(&mut wire);
        }
        wire
    }

    fn drain(reassembler: &mut Reassembler) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(frame) = reassembler.next_frame().unwrap() {
            let tag = frame.tag.unwrap();
            events.extend(parse_response(tag, &frame.payload).unwrap());
        }
        events
    }

    #[test]
    fn test_split_at_every_offset() {
        let events = vec![
            Event::CommandComplete("SELECT 1".into()),
            Event::ReadyForQuery(TransactionStatus::Idle),
        ];
        let wire = encode(&events);

        for cut in 0..=wire.len() {
            let mut reassembler = Reassembler::new();
            reassembler.push(&wire[..cut]);
            let mut seen = drain(&mut reassembler);
            reassembler.push(&wire[cut..]);
            seen.extend(drain(&mut reassembler));
            assert_eq!(seen, events, "cut at {cut}");
            assert_eq!(reassembler.buffered(), 0);
        }
    }

    #[test]
    fn test_header_split_across_three_chunks() {
        let wire = encode(&[Event::ParseComplete, Event::NoData]);
        let mut reassembler = Reassembler::new();
        reassembler.push(&wire[..2]);
        reassembler.push(&wire[2..5]);
        assert_eq!(drain(&mut reassembler), vec![Event::ParseComplete]);
        reassembler.push(&wire[5..7]);
        assert!(drain(&mut reassembler).is_empty());
        reassembler.push(&wire[7..]);
        assert_eq!(drain(&mut reassembler), vec![Event::NoData]);
    }

    #[test]
    fn test_byte_by_byte() {
        let events = vec![
            Event::ParameterStatus {
                name: "DateStyle".into(),
                value: "ISO, MDY".into(),
            },
            Event::BackendKeyData {
                process_id: 1,
                secret_key: 2,
            },
        ];
        let wire = encode(&events);
        let mut reassembler = Reassembler::new();
        let mut seen = Vec::new();
        for byte in &wire {
            reassembler.push(std::slice::from_ref(byte));
            seen.extend(drain(&mut reassembler));
        }
        assert_eq!(seen, events);
    }

    #[test]
    fn test_malformed_length() {
        let mut reassembler = Reassembler::new();
        reassembler.push(&[b'Z', 0, 0, 0, 2]);
        assert!(matches!(
            reassembler.next_frame(),
            Err(Error::MalformedFrame(_))
        ));
    }
}
