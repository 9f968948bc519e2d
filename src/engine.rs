//! The real-time half of the control bridge.
//!
//! [`Engine`] lives inside the audio callback. Once per processing cycle it
//! drains every pending message from the to-audio channel, dispatches each
//! one through the root port tree, then renders the next block. Replies go
//! back through the to-control channel via [`ChannelReply`]; nothing on this
//! path blocks, locks, or allocates.

use std::any::Any;

use crate::channel::{ChannelReader, ChannelWriter};
use crate::message::{Arg, MessageBuf, MessageView};
use crate::midi::{scale_value, MidiEvent, MidiMap};
use crate::ports::{DispatchCtx, Meta, MetaText, Port, Ports, ReplySink};
use crate::synth::{Synth, SYNTH_PORTS};

/// Internal carrier path for raw MIDI bytes crossing the channel.
pub const MIDI_PATH: &str = "/midi";

/// Everything the audio thread owns and mutates. Built once at startup and
/// handed to the engine; the control thread never touches it.
#[derive(Default)]
pub struct EngineState {
    pub synth: Synth,
    pub midi: MidiMap,
}

const HELP_TEXT: &str = "Simple additive synthesis engine controlled over OSC.\n\
    Parameter ports: /synth/enable, /synth/freq, /synth/oscil#/volume, \
    /synth/oscil#/cents, /synth/oscil#/shape\n\
    For some audio enable the output, make one volume non-zero, and set a \
    frequency:\n\
    /synth/enable T\n\
    /synth/oscil0/volume 0.2\n\
    /synth/freq 440.0";

fn help(_msg: &MessageView, _obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    ctx.reply("/display", &[Arg::Str(HELP_TEXT)]);
}

fn echo(msg: &MessageView, _obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    ctx.reply_raw(msg.bytes());
}

fn apropos(msg: &MessageView, _obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    let Some(Arg::Str(needle)) = msg.arg(0) else {
        return;
    };
    match ROOT_PORTS.apropos(needle.trim_start_matches('/')) {
        Some(port) => ctx.reply("/display", &[Arg::Str(port.name)]),
        None => ctx.reply("/display", &[Arg::Str("unknown path...")]),
    };
}

fn describe(msg: &MessageView, _obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    let Some(Arg::Str(needle)) = msg.arg(0) else {
        return;
    };
    match ROOT_PORTS.apropos(needle.trim_start_matches('/')) {
        Some(port) => {
            let mut text = MetaText::new();
            port.meta.render_to(&mut text);
            ctx.reply("/display", &[Arg::Str(text.as_str())])
        }
        None => ctx.reply(
            "/display",
            &[
                Arg::Str("could not find path...<"),
                Arg::Str(needle),
                Arg::Str(">"),
            ],
        ),
    };
}

fn midi_register(msg: &MessageView, obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    let (Some(Arg::Int(controller)), Some(Arg::Str(path))) = (msg.arg(0), msg.arg(1)) else {
        return;
    };
    let Some(state) = obj.downcast_mut::<EngineState>() else {
        return;
    };
    if !state.midi.register(controller, path) {
        ctx.reply("/display", &[Arg::Str("could not register midi mapping")]);
    }
}

fn quit(_msg: &MessageView, _obj: &mut dyn Any, ctx: &mut DispatchCtx) {
    ctx.reply("/disconnect", &[]);
}

/// The full addressable surface: meta ports plus the synth subtree.
pub static ROOT_PORTS: Ports = Ports(&[
    Port::action(
        "echo",
        Meta::doc("Echo the inbound message back").hidden(),
        echo,
    ),
    Port::action("help", Meta::doc("Describe the parameter surface"), help),
    Port::action("apropos", Meta::doc("Find the best matching port"), apropos),
    Port::action(
        "describe",
        Meta::doc("Reply with a port's documentation"),
        describe,
    ),
    Port::action(
        "midi-register",
        Meta::doc("Bind a MIDI controller to a path <ctl id, path>"),
        midi_register,
    ),
    Port::action(
        "quit",
        Meta::doc("Stop the engine and notify the controller"),
        quit,
    ),
    Port::tree(
        "synth",
        Meta::doc("Main ports for synthesis"),
        &SYNTH_PORTS,
        |o, _| {
            o.downcast_mut::<EngineState>()
                .map(|s| &mut s.synth as &mut dyn Any)
        },
    ),
]);

/// Reply sink writing encoded messages into the to-control channel.
pub struct ChannelReply<'a> {
    pub chan: &'a mut ChannelWriter,
    pub buf: &'a mut MessageBuf,
}

impl ReplySink for ChannelReply<'_> {
    fn reply(&mut self, path: &str, args: &[Arg<'_>]) -> bool {
        self.buf.encode(path, args) && self.chan.write(self.buf.bytes())
    }

    fn reply_raw(&mut self, bytes: &[u8]) -> bool {
        self.chan.write(bytes)
    }
}

/// Audio-thread endpoint of the control bridge.
pub struct Engine {
    state: EngineState,
    from_ctl: ChannelReader,
    to_ctl: ChannelWriter,
    reply_buf: MessageBuf,
    midi_buf: MessageBuf,
    sample_rate: f32,
}

impl Engine {
    pub fn new(
        state: EngineState,
        from_ctl: ChannelReader,
        to_ctl: ChannelWriter,
        sample_rate: f32,
    ) -> Self {
        Self {
            state,
            from_ctl,
            to_ctl,
            reply_buf: MessageBuf::new(1024),
            midi_buf: MessageBuf::new(256),
            sample_rate,
        }
    }

    /// Set before the stream starts; the device dictates the real value.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// One processing cycle: drain all pending control messages, then render
    /// a mono block.
    pub fn process(&mut self, out: &mut [f32]) {
        let sample_rate = self.sample_rate;
        let Self {
            state,
            from_ctl,
            to_ctl,
            reply_buf,
            midi_buf,
            ..
        } = self;

        while let Some(bytes) = from_ctl.read() {
            let Some(msg) = MessageView::parse(bytes) else {
                continue;
            };
            let mut sink = ChannelReply {
                chan: &mut *to_ctl,
                buf: &mut *reply_buf,
            };
            let mut ctx = DispatchCtx::new(&mut sink);
            if msg.path() == MIDI_PATH {
                handle_midi(state, &msg, midi_buf, &mut ctx);
                continue;
            }
            ROOT_PORTS.dispatch(msg.path().trim_start_matches('/'), &msg, &mut *state, &mut ctx);
            if ctx.matches == 0 {
                ctx.reply(
                    "/display",
                    &[Arg::Str("no such path...<"), Arg::Str(msg.path()), Arg::Str(">")],
                );
            }
        }

        state.synth.render(out, sample_rate);
    }
}

fn handle_midi(
    state: &mut EngineState,
    msg: &MessageView,
    midi_buf: &mut MessageBuf,
    ctx: &mut DispatchCtx,
) {
    let Some(Arg::Blob(raw)) = msg.arg(0) else {
        return;
    };
    match MidiEvent::from_bytes(raw) {
        Some(MidiEvent::NoteOn { note, .. }) => state.synth.note_on(note),
        Some(MidiEvent::NoteOff { note }) => state.synth.note_off(note),
        Some(MidiEvent::ControlChange { controller, value }) => {
            // Copy the bound path out so the borrow of the midi table ends
            // before dispatch mutates the state.
            let mut path = [0u8; 64];
            let len = match state.midi.path(controller) {
                Some(bound) => {
                    path[..bound.len()].copy_from_slice(bound.as_bytes());
                    bound.len()
                }
                None => return,
            };
            let Ok(path) = std::str::from_utf8(&path[..len]) else {
                return;
            };
            let Some(port) = ROOT_PORTS.find(path) else {
                return;
            };
            let Some(arg) = scale_value(port, value) else {
                return;
            };
            if !midi_buf.encode(path, &[arg]) {
                return;
            }
            let Some(mapped) = MessageView::parse(midi_buf.bytes()) else {
                return;
            };
            ROOT_PORTS.dispatch(
                mapped.path().trim_start_matches('/'),
                &mapped,
                state,
                ctx,
            );
        }
        None => {}
    }
}
