//! Control-thread half of the bridge: wire protocol in, channel traffic out.
//!
//! Inbound datagrams are decoded with `rosc`; the three reserved control
//! paths are handled here synchronously, everything else is forwarded
//! verbatim into the to-audio channel. Replies drained from the audio thread
//! fan out to the logging subscribers and the current controller.
//!
//! Network sends go through the [`Transport`] trait so tests can record them
//! instead of opening sockets.

use std::collections::BTreeSet;

use rosc::{OscMessage, OscPacket, OscType};
use tracing::{debug, info, warn};

use crate::channel::{ChannelReader, ChannelWriter};
use crate::engine::{MIDI_PATH, ROOT_PORTS};

/// Outbound datagram delivery, keyed by address text.
pub trait Transport {
    fn send(&mut self, addr: &str, payload: &[u8]);
}

/// Translates between the OSC wire and the two channels, and tracks the peers
/// interested in replies.
pub struct ControlBridge<T: Transport> {
    to_audio: ChannelWriter,
    from_audio: ChannelReader,
    transport: T,
    /// Peers subscribed via `/logging-start`.
    subscribers: BTreeSet<String>,
    /// Address of the most recent sender, not yet confirmed by the engine.
    last_seen: Option<String>,
    /// Controller address confirmed through the `/echo OSC_URL` round trip.
    controller: Option<String>,
}

impl<T: Transport> ControlBridge<T> {
    pub fn new(to_audio: ChannelWriter, from_audio: ChannelReader, transport: T) -> Self {
        Self {
            to_audio,
            from_audio,
            transport,
            subscribers: BTreeSet::new(),
            last_seen: None,
            controller: None,
        }
    }

    /// Handles one inbound datagram from `source`. Malformed payloads are
    /// dropped without reply; reserved paths never touch the audio channel.
    pub fn on_inbound(&mut self, bytes: &[u8], source: &str) {
        let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(bytes) else {
            debug!(source, "ignoring malformed OSC datagram");
            return;
        };

        if self.last_seen.as_deref() != Some(source) {
            self.last_seen = Some(source.to_string());
            // Round-trips through the engine so the address update is
            // ordered with the replies it affects.
            self.write_to_audio(
                "/echo",
                vec![
                    OscType::String("OSC_URL".to_string()),
                    OscType::String(source.to_string()),
                ],
            );
        }

        match msg.addr.as_str() {
            "/logging-start" => {
                info!(source, "logging subscriber added");
                self.subscribers.insert(source.to_string());
            }
            "/logging-stop" => {
                info!(source, "logging subscriber removed");
                self.subscribers.remove(source);
            }
            "/path-search" => self.path_search(&msg),
            _ => {
                if !self.to_audio.write(bytes) {
                    warn!(path = %msg.addr, "to-audio channel full, message dropped");
                }
            }
        }
    }

    /// Forwards a raw MIDI event to the engine. The control loop is the only
    /// writer of the to-audio channel, so hardware events funnel through it.
    pub fn send_midi(&mut self, raw: &[u8]) {
        self.write_to_audio(MIDI_PATH, vec![OscType::Blob(raw.to_vec())]);
    }

    /// Drains every reply available from the audio thread, fanning each out
    /// to the logging subscribers plus the controller when it is not already
    /// one of them. Returns `false` once a `/disconnect` has been delivered.
    pub fn drain_outbound(&mut self) -> bool {
        let mut keep_running = true;
        let Self {
            from_audio,
            transport,
            subscribers,
            controller,
            ..
        } = self;

        while let Some(bytes) = from_audio.read() {
            let Ok((_, OscPacket::Message(msg))) = rosc::decoder::decode_udp(bytes) else {
                debug!("ignoring malformed reply from engine");
                continue;
            };

            // Internal address-learned notification: update and swallow.
            if msg.addr == "/echo" {
                if let [OscType::String(key), OscType::String(url)] = msg.args.as_slice() {
                    if key == "OSC_URL" {
                        *controller = Some(url.clone());
                        continue;
                    }
                }
            }

            for sub in subscribers.iter() {
                transport.send(sub, bytes);
            }
            // Controller snapshot taken per reply; a peer in both roles gets
            // exactly one copy.
            if let Some(ctl) = controller.as_deref() {
                if !subscribers.contains(ctl) {
                    transport.send(ctl, bytes);
                }
            }

            if msg.addr == "/disconnect" {
                info!("engine disconnected, shutting down control loop");
                keep_running = false;
            }
        }
        keep_running
    }

    fn path_search(&mut self, msg: &OscMessage) {
        let [OscType::String(root), OscType::String(needle)] = msg.args.as_slice() else {
            debug!("path-search wants (s root, s fragment)");
            return;
        };
        let prefix = format!("/{}", root.trim_start_matches('/'));

        let mut args = Vec::new();
        ROOT_PORTS.search(needle, &mut |path, port| {
            let under_root = prefix == "/"
                || path == prefix
                || (path.starts_with(&prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'));
            if under_root {
                args.push(OscType::String(path.to_string()));
                args.push(OscType::Blob(port.meta.render().into_bytes()));
            }
        });

        let reply = OscPacket::Message(OscMessage {
            addr: "/paths".to_string(),
            args,
        });
        let (Ok(payload), Some(addr)) = (rosc::encoder::encode(&reply), self.last_seen.as_deref())
        else {
            return;
        };
        self.transport.send(addr, &payload);
    }

    fn write_to_audio(&mut self, addr: &str, args: Vec<OscType>) {
        let packet = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        match rosc::encoder::encode(&packet) {
            Ok(payload) => {
                if !self.to_audio.write(&payload) {
                    warn!(addr, "to-audio channel full, message dropped");
                }
            }
            Err(e) => debug!(addr, error = ?e, "failed to encode channel message"),
        }
    }

    /// Consumes the bridge, handing back the transport. Lets callers inspect
    /// a recording transport after a test run.
    pub fn into_transport(self) -> T {
        self.transport
    }

    #[cfg(test)]
    pub(crate) fn subscribers(&self) -> &BTreeSet<String> {
        &self.subscribers
    }
}
