//! Lock-free bounded message channel between the control and audio threads.
//!
//! A thin framing layer over a `ringbuf` SPSC byte ring: each message is a
//! 4-byte little-endian length prefix followed by its payload. Writes are
//! all-or-nothing, so the reader never observes a partial message. Neither
//! side blocks or allocates after construction.
//!
//! One thread owns the [`ChannelWriter`], one (possibly different) thread
//! owns the [`ChannelReader`]; that split is the entire synchronization
//! contract.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

const HEADER: usize = 4;

/// Creates a channel holding up to `capacity` bytes of framed messages.
///
/// `max_msg` bounds a single message's payload and sizes the reader's scratch
/// buffer; larger writes are rejected outright.
pub fn message_channel(capacity: usize, max_msg: usize) -> (ChannelWriter, ChannelReader) {
    let (prod, cons) = HeapRb::<u8>::new(capacity).split();
    (
        ChannelWriter {
            prod,
            staging: vec![0u8; HEADER + max_msg].into_boxed_slice(),
        },
        ChannelReader {
            cons,
            scratch: vec![0u8; max_msg].into_boxed_slice(),
            peeked: None,
        },
    )
}

/// Producing half of a message channel.
pub struct ChannelWriter {
    prod: HeapProd<u8>,
    /// Header and payload are staged here so the whole frame lands in one
    /// `push_slice`; the reader must never observe a header without its
    /// payload behind it.
    staging: Box<[u8]>,
}

impl ChannelWriter {
    /// Appends a copy of `msg`. Returns `false`, writing nothing, if the
    /// message is oversized or the channel lacks space for the whole frame.
    pub fn write(&mut self, msg: &[u8]) -> bool {
        let frame = HEADER + msg.len();
        if frame > self.staging.len() {
            return false;
        }
        if self.prod.vacant_len() < frame {
            return false;
        }
        self.staging[..HEADER].copy_from_slice(&(msg.len() as u32).to_le_bytes());
        self.staging[HEADER..frame].copy_from_slice(msg);
        // Single commit: the write index is published exactly once per frame.
        self.prod.push_slice(&self.staging[..frame]);
        true
    }
}

/// Consuming half of a message channel.
pub struct ChannelReader {
    cons: HeapCons<u8>,
    scratch: Box<[u8]>,
    /// Length of a frame already pulled into `scratch` by `peek` but not yet
    /// surrendered by `read`.
    peeked: Option<usize>,
}

impl ChannelReader {
    /// Whether at least one complete message is waiting.
    pub fn has_next(&self) -> bool {
        // Writes are atomic, so any buffered bytes form whole frames.
        self.peeked.is_some() || self.cons.occupied_len() >= HEADER
    }

    /// Pulls the next frame off the ring into the scratch buffer.
    fn pop_frame(&mut self) -> Option<usize> {
        if self.cons.occupied_len() < HEADER {
            return None;
        }
        let mut hdr = [0u8; HEADER];
        self.cons.pop_slice(&mut hdr);
        let len = u32::from_le_bytes(hdr) as usize;
        let got = self.cons.pop_slice(&mut self.scratch[..len]);
        debug_assert_eq!(got, len);
        Some(len)
    }

    /// Pops the next message. The returned view stays valid until the next
    /// `read` or `peek` on this reader.
    pub fn read(&mut self) -> Option<&[u8]> {
        let len = match self.peeked.take() {
            Some(len) => len,
            None => self.pop_frame()?,
        };
        Some(&self.scratch[..len])
    }

    /// Copies out the next message without logically advancing the cursor;
    /// the following `read` returns the same message.
    pub fn peek(&mut self) -> Option<&[u8]> {
        let len = match self.peeked {
            Some(len) => len,
            None => {
                let len = self.pop_frame()?;
                self.peeked = Some(len);
                len
            }
        };
        Some(&self.scratch[..len])
    }
}
