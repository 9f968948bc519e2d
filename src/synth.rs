//! The additive synth the port tree addresses.
//!
//! Plain mutable state owned by the audio thread; every field change arrives
//! through the port accessors in [`SYNTH_PORTS`], never by direct reference
//! from the control side.

use std::any::Any;

use crate::ports::{Meta, Port, Ports};

/// Number of oscillators in the bank.
pub const OSCIL_COUNT: usize = 16;

/// Depth of the monophonic note-priority stack.
const NOTE_STACK: usize = 16;

/// One element of the oscillator bank.
#[derive(Debug, Clone, Copy, Default)]
pub struct Oscil {
    pub volume: f32,
    pub cents: f32,
    pub shape: i32,
    phase: f32,
}

/// Port schema shared by every element of the oscillator bank.
pub static OSCIL_PORTS: Ports = Ports(&[
    Port::float(
        "cents",
        Meta::doc("Detune in cents").range(-1200.0, 1200.0),
        |o| o.downcast_ref::<Oscil>().map(|o| o.cents),
        |o, v| {
            if let Some(o) = o.downcast_mut::<Oscil>() {
                o.cents = v;
            }
        },
    ),
    Port::float(
        "volume",
        Meta::doc("Volume on a linear scale").range(0.0, 1.0),
        |o| o.downcast_ref::<Oscil>().map(|o| o.volume),
        |o, v| {
            if let Some(o) = o.downcast_mut::<Oscil>() {
                o.volume = v;
            }
        },
    ),
    Port::int(
        "shape",
        Meta::doc("Shape of the oscillator")
            .range(0.0, 2.0)
            .options(&["ramp", "sine", "square"]),
        |o| o.downcast_ref::<Oscil>().map(|o| o.shape),
        |o, v| {
            if let Some(o) = o.downcast_mut::<Oscil>() {
                o.shape = v;
            }
        },
    ),
]);

/// The whole synthesis voice: base frequency, output gate, oscillator bank,
/// and the note stack feeding `freq`/`enable` from MIDI.
#[derive(Debug)]
pub struct Synth {
    pub freq: f32,
    pub enable: bool,
    pub oscil: [Oscil; OSCIL_COUNT],
    notes: [u8; NOTE_STACK],
}

impl Default for Synth {
    fn default() -> Self {
        Self {
            freq: 440.0,
            enable: false,
            oscil: [Oscil::default(); OSCIL_COUNT],
            notes: [0; NOTE_STACK],
        }
    }
}

pub static SYNTH_PORTS: Ports = Ports(&[
    Port::float(
        "freq",
        Meta::doc("Base frequency of the note").range(0.0, 20_000.0),
        |o| o.downcast_ref::<Synth>().map(|s| s.freq),
        |o, v| {
            if let Some(s) = o.downcast_mut::<Synth>() {
                s.freq = v;
            }
        },
    ),
    Port::boolean(
        "enable",
        Meta::doc("Enable or disable audio output"),
        |o| o.downcast_ref::<Synth>().map(|s| s.enable),
        |o, v| {
            if let Some(s) = o.downcast_mut::<Synth>() {
                s.enable = v;
            }
        },
    ),
    Port::array(
        "oscil",
        OSCIL_COUNT,
        Meta::doc("Oscillator bank element"),
        &OSCIL_PORTS,
        |o, i| {
            o.downcast_mut::<Synth>()
                .map(|s| &mut s.oscil[i] as &mut dyn Any)
        },
    ),
]);

fn midi_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

impl Synth {
    /// Latest-note-priority note on: retunes immediately, pushes the note to
    /// the front of the stack (no duplicates), opens the gate.
    pub fn note_on(&mut self, note: u8) {
        self.freq = midi_to_hz(note);
        self.enable = true;
        if self.notes.contains(&note) {
            return;
        }
        for i in (1..NOTE_STACK).rev() {
            self.notes[i] = self.notes[i - 1];
        }
        self.notes[0] = note;
    }

    /// Removes a released note; retunes to the most recent held note, or
    /// closes the gate when none remain.
    pub fn note_off(&mut self, note: u8) {
        if let Some(pos) = self.notes.iter().position(|&n| n == note) {
            for i in pos..NOTE_STACK - 1 {
                self.notes[i] = self.notes[i + 1];
            }
            self.notes[NOTE_STACK - 1] = 0;
        }
        match self.notes[0] {
            0 => self.enable = false,
            top => self.freq = midi_to_hz(top),
        }
    }

    /// Renders one mono block additively across the bank. Silence while the
    /// gate is closed; oscillator phases keep their positions.
    pub fn render(&mut self, out: &mut [f32], sample_rate: f32) {
        out.fill(0.0);
        if !self.enable || sample_rate <= 0.0 {
            return;
        }
        for osc in &mut self.oscil {
            let freq = self.freq * 2f32.powf(osc.cents / 1200.0);
            let inc = freq / sample_rate;
            for sample in out.iter_mut() {
                *sample += osc.volume * warp(osc.shape, osc.phase);
                osc.phase += inc;
                if osc.phase > 1.0 {
                    osc.phase -= 1.0;
                }
            }
        }
    }
}

/// Phase-to-amplitude waveshaper: 0 = ramp, 1 = sine, 2 = square.
pub fn warp(shape: i32, phase: f32) -> f32 {
    match shape {
        0 => phase,
        1 => (2.0 * std::f32::consts::PI * phase).sin(),
        2 => {
            if phase < 0.5 {
                -1.0
            } else {
                1.0
            }
        }
        _ => 0.0,
    }
}
