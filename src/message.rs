//! OSC 1.0 message encoding for the real-time path.
//!
//! The control thread talks to the network with `rosc`; the audio thread
//! cannot afford `rosc`'s owned `String`/`Vec` decoding, so this module
//! provides a borrowed [`MessageView`] over raw OSC bytes plus
//! [`MessageBuf`], a fixed-capacity scratch buffer for composing replies.
//! Both sides produce the same wire format, so messages can be copied
//! byte-for-byte between channels and decoded by either codec.

/// One typed OSC argument, borrowed from the underlying message bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Str(&'a str),
    Int(i32),
    Float(f32),
    Bool(bool),
    Blob(&'a [u8]),
}

impl Arg<'_> {
    /// OSC type-tag byte for this argument.
    pub fn tag(&self) -> u8 {
        match self {
            Arg::Str(_) => b's',
            Arg::Int(_) => b'i',
            Arg::Float(_) => b'f',
            Arg::Bool(true) => b'T',
            Arg::Bool(false) => b'F',
            Arg::Blob(_) => b'b',
        }
    }
}

/// Rounds a C-string length (including its NUL) up to the OSC 4-byte pad.
fn padded(len: usize) -> usize {
    (len + 4) & !3
}

/// Reads a padded OSC string starting at `off`, returning it and the offset
/// of the field that follows.
fn read_padded_str(bytes: &[u8], off: usize) -> Option<(&str, usize)> {
    let rel = bytes.get(off..)?;
    let nul = rel.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&rel[..nul]).ok()?;
    let next = off + padded(nul);
    if next > bytes.len() {
        return None;
    }
    Some((s, next))
}

fn read_u32(bytes: &[u8], off: usize) -> Option<u32> {
    let raw = bytes.get(off..off + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// A validated, zero-allocation view of one OSC message.
///
/// Parsing walks the whole argument region once, so every later
/// [`arg`](Self::arg) access is bounds-safe.
#[derive(Debug, Clone, Copy)]
pub struct MessageView<'a> {
    bytes: &'a [u8],
    path: &'a str,
    tags: &'a str,
    args_off: usize,
}

impl<'a> MessageView<'a> {
    /// Parses `bytes` as an OSC message. Returns `None` for anything
    /// malformed: missing `/` prefix, missing `,` tag string, unknown tags,
    /// or truncated argument data.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let (path, tags_off) = read_padded_str(bytes, 0)?;
        if !path.starts_with('/') {
            return None;
        }
        let (tag_str, args_off) = read_padded_str(bytes, tags_off)?;
        let tags = tag_str.strip_prefix(',')?;

        // Validate the whole argument region up front.
        let mut off = args_off;
        for tag in tags.bytes() {
            off = arg_end(bytes, off, tag)?;
        }

        Some(Self {
            bytes,
            path,
            tags,
            args_off,
        })
    }

    /// The raw encoded bytes backing this view.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The address pattern, including its leading `/`.
    pub fn path(&self) -> &'a str {
        self.path
    }

    /// Type-tag string without the leading comma.
    pub fn tags(&self) -> &'a str {
        self.tags
    }

    pub fn arg_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns the `i`-th argument, or `None` past the end.
    pub fn arg(&self, i: usize) -> Option<Arg<'a>> {
        self.args().nth(i)
    }

    pub fn args(&self) -> ArgIter<'a> {
        ArgIter {
            bytes: self.bytes,
            tags: self.tags.as_bytes(),
            idx: 0,
            off: self.args_off,
        }
    }
}

/// Offset just past the argument with type `tag` starting at `off`.
fn arg_end(bytes: &[u8], off: usize, tag: u8) -> Option<usize> {
    match tag {
        b'i' | b'f' => {
            if off + 4 > bytes.len() {
                return None;
            }
            Some(off + 4)
        }
        b's' => read_padded_str(bytes, off).map(|(_, next)| next),
        b'b' => {
            let len = read_u32(bytes, off)? as usize;
            let next = off + 4 + ((len + 3) & !3);
            if next > bytes.len() {
                return None;
            }
            Some(next)
        }
        b'T' | b'F' => Some(off),
        _ => None,
    }
}

/// Iterator over a message's arguments in declaration order.
pub struct ArgIter<'a> {
    bytes: &'a [u8],
    tags: &'a [u8],
    idx: usize,
    off: usize,
}

impl<'a> Iterator for ArgIter<'a> {
    type Item = Arg<'a>;

    fn next(&mut self) -> Option<Arg<'a>> {
        let tag = *self.tags.get(self.idx)?;
        self.idx += 1;
        // Sizes were validated by `MessageView::parse`.
        let arg = match tag {
            b'i' => Arg::Int(read_u32(self.bytes, self.off)? as i32),
            b'f' => Arg::Float(f32::from_bits(read_u32(self.bytes, self.off)?)),
            b's' => {
                let (s, _) = read_padded_str(self.bytes, self.off)?;
                Arg::Str(s)
            }
            b'b' => {
                let len = read_u32(self.bytes, self.off)? as usize;
                Arg::Blob(self.bytes.get(self.off + 4..self.off + 4 + len)?)
            }
            b'T' => Arg::Bool(true),
            b'F' => Arg::Bool(false),
            _ => return None,
        };
        self.off = arg_end(self.bytes, self.off, tag)?;
        Some(arg)
    }
}

/// Fixed-capacity scratch buffer for composing OSC messages.
///
/// Allocates once at construction and never again; a message that would not
/// fit makes [`encode`](Self::encode) return `false` and leaves the buffer
/// empty rather than truncated.
pub struct MessageBuf {
    buf: Box<[u8]>,
    len: usize,
}

impl MessageBuf {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// The most recently encoded message.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Encodes `path` and `args` as a complete OSC message, replacing any
    /// previous contents. Returns `false` (and clears the buffer) if the
    /// message exceeds capacity.
    pub fn encode(&mut self, path: &str, args: &[Arg]) -> bool {
        self.len = 0;
        if !self.try_encode(path, args) {
            self.len = 0;
            return false;
        }
        true
    }

    fn try_encode(&mut self, path: &str, args: &[Arg]) -> bool {
        if !self.put_padded_str(path) {
            return false;
        }
        // Tag string: ',' + one tag per arg, NUL-terminated, padded.
        if !self.put(&[b',']) {
            return false;
        }
        for a in args {
            if !self.put(&[a.tag()]) {
                return false;
            }
        }
        if !self.terminate() {
            return false;
        }
        for a in args {
            let ok = match a {
                Arg::Int(v) => self.put(&v.to_be_bytes()),
                Arg::Float(v) => self.put(&v.to_be_bytes()),
                Arg::Str(s) => self.put_padded_str(s),
                Arg::Bool(_) => true,
                Arg::Blob(data) => {
                    self.put(&(data.len() as i32).to_be_bytes())
                        && self.put(data)
                        && self.pad()
                }
            };
            if !ok {
                return false;
            }
        }
        true
    }

    fn put(&mut self, data: &[u8]) -> bool {
        let end = self.len + data.len();
        if end > self.buf.len() {
            return false;
        }
        self.buf[self.len..end].copy_from_slice(data);
        self.len = end;
        true
    }

    fn put_padded_str(&mut self, s: &str) -> bool {
        self.put(s.as_bytes()) && self.terminate()
    }

    /// NUL terminator plus padding out to the 4-byte boundary.
    fn terminate(&mut self) -> bool {
        if !self.put(&[0]) {
            return false;
        }
        self.pad()
    }

    fn pad(&mut self) -> bool {
        while self.len % 4 != 0 {
            if !self.put(&[0]) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::{OscMessage, OscPacket, OscType};

    fn encode(path: &str, args: &[Arg]) -> Vec<u8> {
        let mut buf = MessageBuf::new(512);
        assert!(buf.encode(path, args));
        buf.bytes().to_vec()
    }

    #[test]
    fn round_trip_all_types() {
        let bytes = encode(
            "/synth/oscil3/volume",
            &[
                Arg::Float(0.25),
                Arg::Int(-7),
                Arg::Str("hello"),
                Arg::Bool(true),
                Arg::Bool(false),
                Arg::Blob(&[1, 2, 3, 4, 5]),
            ],
        );
        let msg = MessageView::parse(&bytes).unwrap();
        assert_eq!(msg.path(), "/synth/oscil3/volume");
        assert_eq!(msg.tags(), "fisTFb");
        assert_eq!(msg.arg(0), Some(Arg::Float(0.25)));
        assert_eq!(msg.arg(1), Some(Arg::Int(-7)));
        assert_eq!(msg.arg(2), Some(Arg::Str("hello")));
        assert_eq!(msg.arg(3), Some(Arg::Bool(true)));
        assert_eq!(msg.arg(4), Some(Arg::Bool(false)));
        assert_eq!(msg.arg(5), Some(Arg::Blob(&[1, 2, 3, 4, 5][..])));
        assert_eq!(msg.arg(6), None);
    }

    #[test]
    fn rosc_decodes_our_encoding() {
        let bytes = encode("/freq", &[Arg::Float(440.0), Arg::Str("note")]);
        let (_, packet) = rosc::decoder::decode_udp(&bytes).unwrap();
        let OscPacket::Message(msg) = packet else {
            panic!("expected a message");
        };
        assert_eq!(msg.addr, "/freq");
        assert_eq!(
            msg.args,
            vec![OscType::Float(440.0), OscType::String("note".into())]
        );
    }

    #[test]
    fn we_decode_rosc_encoding() {
        let packet = OscPacket::Message(OscMessage {
            addr: "/oscil0/shape".to_string(),
            args: vec![OscType::Int(2), OscType::Bool(true)],
        });
        let bytes = rosc::encoder::encode(&packet).unwrap();
        let msg = MessageView::parse(&bytes).unwrap();
        assert_eq!(msg.path(), "/oscil0/shape");
        assert_eq!(msg.arg(0), Some(Arg::Int(2)));
        assert_eq!(msg.arg(1), Some(Arg::Bool(true)));
    }

    #[test]
    fn empty_args_message() {
        let bytes = encode("/quit", &[]);
        let msg = MessageView::parse(&bytes).unwrap();
        assert_eq!(msg.path(), "/quit");
        assert_eq!(msg.arg_count(), 0);
        assert_eq!(msg.arg(0), None);
    }

    #[test]
    fn rejects_malformed() {
        assert!(MessageView::parse(b"").is_none());
        // No leading slash.
        assert!(MessageView::parse(&encode_raw("freq")).is_none());
        // Truncated argument region.
        let mut bytes = encode("/freq", &[Arg::Float(1.0)]);
        bytes.truncate(bytes.len() - 2);
        assert!(MessageView::parse(&bytes).is_none());
    }

    fn encode_raw(path: &str) -> Vec<u8> {
        let mut out = path.as_bytes().to_vec();
        out.push(0);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out.extend_from_slice(b",\0\0\0");
        out
    }

    #[test]
    fn overflow_reports_failure_and_clears() {
        let mut buf = MessageBuf::new(16);
        assert!(!buf.encode("/a/very/long/path/that/cannot/fit", &[]));
        assert!(buf.bytes().is_empty());
        // The buffer is still usable afterwards.
        assert!(buf.encode("/ok", &[]));
        assert!(MessageView::parse(buf.bytes()).is_some());
    }
}
