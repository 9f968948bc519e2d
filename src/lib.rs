//! # portlink - OSC parameter bridge for a real-time synth engine
//!
//! An external controller addresses, introspects, and mutates live
//! parameters of a running audio engine using hierarchical OSC path
//! messages, while the audio thread never blocks, locks, or allocates.
//!
//! Two pieces carry the whole design:
//!
//! - [`channel`]: a pair of lock-free, bounded, single-producer /
//!   single-consumer byte-message channels connecting the audio and control
//!   threads. Writes that do not fit are dropped whole; nothing ever blocks.
//! - [`ports`]: a static, self-describing parameter tree mapping paths like
//!   `/synth/oscil3/volume` to typed accessors over the runtime state, with
//!   fuzzy lookup (`apropos`) and full enumeration for remote introspection
//!   (`/path-search`).
//!
//! Around them sit the [`engine`] (audio-thread endpoint: drain, dispatch,
//! render), the [`bridge`] (control-thread endpoint: UDP in, reply fan-out to
//! logging subscribers), and thin glue for cpal audio output ([`audio`]) and
//! MIDI input ([`midi`]).
//!
//! ## Wire surface
//!
//! Parameters: `/synth/enable`, `/synth/freq`, `/synth/oscil<N>/{volume,
//! cents, shape}` for N in 0..16. A message with no arguments queries the
//! current value; a typed argument sets it. Meta ports: `/help`,
//! `/apropos s`, `/describe s`, `/midi-register i s`, `/quit`. Reserved
//! bridge paths: `/logging-start`, `/logging-stop`, `/path-search s s`.

pub mod audio;
pub mod bridge;
pub mod channel;
pub mod engine;
pub mod message;
pub mod midi;
pub mod ports;
pub mod synth;

pub use bridge::{ControlBridge, Transport};
pub use channel::{message_channel, ChannelReader, ChannelWriter};
pub use engine::{Engine, EngineState, ROOT_PORTS};
pub use message::{Arg, MessageBuf, MessageView};
pub use ports::{Access, DispatchCtx, Meta, Port, PortKind, Ports, ReplySink};
pub use synth::{Oscil, Synth, OSCIL_COUNT};
