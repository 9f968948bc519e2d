//! MIDI collaborator boundary.
//!
//! Raw events reach the audio thread as `/midi b <bytes>` channel messages;
//! this module parses them and holds the controller-change registration
//! table. Bindings live in fixed-size buffers so registering and firing a
//! mapping never allocates on the audio thread.

use crate::message::Arg;
use crate::ports::{Access, Port, PortKind};

/// Longest registrable target path, bytes.
const MAX_PATH: usize = 64;

/// A decoded MIDI voice message, reduced to what the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
}

impl MidiEvent {
    /// Parses raw MIDI bytes. Note-on with zero velocity is a note-off.
    /// Anything else (program change, pitch bend, sysex) yields `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        match status & 0xF0 {
            0x90 if bytes.len() >= 3 && bytes[2] > 0 => Some(MidiEvent::NoteOn {
                note: bytes[1],
                velocity: bytes[2],
            }),
            0x90 if bytes.len() >= 3 => Some(MidiEvent::NoteOff { note: bytes[1] }),
            0x80 if bytes.len() >= 3 => Some(MidiEvent::NoteOff { note: bytes[1] }),
            0xB0 if bytes.len() >= 3 => Some(MidiEvent::ControlChange {
                controller: bytes[1],
                value: bytes[2],
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
struct Binding {
    path: [u8; MAX_PATH],
    len: usize,
}

/// Controller-change to port-path registration table, indexed by controller
/// id. Populated through the `/midi-register` port.
pub struct MidiMap {
    bindings: [Option<Binding>; 128],
}

impl Default for MidiMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiMap {
    pub fn new() -> Self {
        const EMPTY: Option<Binding> = None;
        Self {
            bindings: [EMPTY; 128],
        }
    }

    /// Binds `controller` to `path`. The path is normalized to carry a
    /// leading `/`. Returns `false` for out-of-range ids or paths longer
    /// than the fixed binding buffer.
    pub fn register(&mut self, controller: i32, path: &str) -> bool {
        if !(0..128).contains(&controller) {
            return false;
        }
        let trimmed = path.trim_start_matches('/');
        if 1 + trimmed.len() > MAX_PATH {
            return false;
        }
        let mut binding = Binding {
            path: [0; MAX_PATH],
            len: 1 + trimmed.len(),
        };
        binding.path[0] = b'/';
        binding.path[1..binding.len].copy_from_slice(trimmed.as_bytes());
        self.bindings[controller as usize] = Some(binding);
        true
    }

    /// The path bound to `controller`, if any.
    pub fn path(&self, controller: u8) -> Option<&str> {
        let binding = self.bindings.get(controller as usize)?.as_ref()?;
        // Built from str bytes in `register`.
        std::str::from_utf8(&binding.path[..binding.len]).ok()
    }
}

/// Scales a 7-bit controller value into the bound port's argument domain:
/// floats and ints interpolate the declared range, booleans switch at the
/// midpoint. Tree and action ports are not mappable.
pub fn scale_value(port: &Port, value: u8) -> Option<Arg<'static>> {
    let t = f32::from(value.min(127)) / 127.0;
    match &port.kind {
        PortKind::Param(Access::Float { .. }) => {
            let min = port.meta.min.unwrap_or(0.0);
            let max = port.meta.max.unwrap_or(1.0);
            Some(Arg::Float(min + (max - min) * t))
        }
        PortKind::Param(Access::Int { .. }) => {
            let min = port.meta.min.unwrap_or(0.0);
            let max = port.meta.max.unwrap_or(127.0);
            Some(Arg::Int((min + (max - min) * t).round() as i32))
        }
        PortKind::Param(Access::Bool { .. }) => Some(Arg::Bool(value >= 64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::SYNTH_PORTS;

    #[test]
    fn parses_voice_messages() {
        assert_eq!(
            MidiEvent::from_bytes(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0x91, 60, 0]),
            Some(MidiEvent::NoteOff { note: 60 })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0x80, 60, 64]),
            Some(MidiEvent::NoteOff { note: 60 })
        );
        assert_eq!(
            MidiEvent::from_bytes(&[0xB3, 21, 127]),
            Some(MidiEvent::ControlChange {
                controller: 21,
                value: 127
            })
        );
        assert_eq!(MidiEvent::from_bytes(&[0xC0, 5]), None);
        assert_eq!(MidiEvent::from_bytes(&[]), None);
    }

    #[test]
    fn register_normalizes_and_bounds() {
        let mut map = MidiMap::new();
        assert!(map.register(21, "synth/freq"));
        assert_eq!(map.path(21), Some("/synth/freq"));
        assert!(map.register(22, "/synth/oscil0/volume"));
        assert_eq!(map.path(22), Some("/synth/oscil0/volume"));
        assert!(map.path(23).is_none());
        assert!(!map.register(-1, "/x"));
        assert!(!map.register(128, "/x"));
        let long = "x".repeat(80);
        assert!(!map.register(24, &long));
    }

    #[test]
    fn scales_into_port_domains() {
        let freq = SYNTH_PORTS.find("freq").unwrap();
        assert_eq!(scale_value(freq, 0), Some(Arg::Float(0.0)));
        assert_eq!(scale_value(freq, 127), Some(Arg::Float(20_000.0)));

        let shape = SYNTH_PORTS.find("oscil0/shape").unwrap();
        assert_eq!(scale_value(shape, 127), Some(Arg::Int(2)));
        assert_eq!(scale_value(shape, 0), Some(Arg::Int(0)));

        let enable = SYNTH_PORTS.find("enable").unwrap();
        assert_eq!(scale_value(enable, 100), Some(Arg::Bool(true)));
        assert_eq!(scale_value(enable, 10), Some(Arg::Bool(false)));

        let bank = SYNTH_PORTS.find("oscil0").unwrap();
        assert!(scale_value(bank, 64).is_none());
    }

    #[test]
    fn int_scaling_spans_a_signed_range() {
        use crate::ports::Meta;
        static COARSE: Port = Port::int(
            "coarse",
            Meta::doc("Coarse detune in semitones").range(-24.0, 24.0),
            |_| None,
            |_, _| {},
        );
        assert_eq!(scale_value(&COARSE, 0), Some(Arg::Int(-24)));
        assert_eq!(scale_value(&COARSE, 127), Some(Arg::Int(24)));
    }
}
