//! portlink CLI: start the synth engine and serve OSC control over UDP.

use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

use clap::Parser;
use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{debug, info, warn};

use portlink::bridge::Transport;
use portlink::{audio, message_channel, ControlBridge, Engine, EngineState};

#[derive(Parser)]
#[command(name = "portlink")]
#[command(about = "OSC-controlled additive synth engine", long_about = None)]
struct Cli {
    /// UDP port to listen on for OSC control messages
    #[arg(short, long, default_value = "7777")]
    port: u16,

    /// Connect MIDI input from the first port whose name contains this text
    #[arg(short, long)]
    midi: Option<String>,

    /// Capacity in bytes of each cross-thread channel
    #[arg(long, default_value = "8192")]
    channel_bytes: usize,

    /// Largest single message either thread may send
    #[arg(long, default_value = "1024")]
    max_msg: usize,
}

/// Sends reply datagrams to peers recorded by address text.
struct UdpTransport {
    socket: UdpSocket,
}

impl Transport for UdpTransport {
    fn send(&mut self, addr: &str, payload: &[u8]) {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = self.socket.send_to(payload, addr) {
                    debug!(%addr, "reply send failed: {e}");
                }
            }
            Err(_) => debug!(addr, "unparseable peer address"),
        }
    }
}

fn open_midi(
    name: &str,
) -> Result<(MidiInputConnection<()>, Receiver<Vec<u8>>), Box<dyn std::error::Error>> {
    let mut input = MidiInput::new("portlink")?;
    input.ignore(Ignore::None);
    let ports = input.ports();
    let port = ports
        .iter()
        .find(|p| {
            input
                .port_name(p)
                .map(|n| n.contains(name))
                .unwrap_or(false)
        })
        .ok_or("no MIDI input port matches")?;
    info!("MIDI input: {}", input.port_name(port)?);

    let (tx, rx) = channel();
    let conn = input.connect(
        port,
        "portlink-in",
        move |_stamp, bytes, _| {
            let _ = tx.send(bytes.to_vec());
        },
        (),
    )?;
    Ok((conn, rx))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // One channel per direction; each has exactly one writer and one reader.
    let (to_audio_w, to_audio_r) = message_channel(cli.channel_bytes, cli.max_msg);
    let (to_ctl_w, to_ctl_r) = message_channel(cli.channel_bytes, cli.max_msg);

    let engine = Engine::new(EngineState::default(), to_audio_r, to_ctl_w, 44_100.0);
    let audio = audio::start(engine)?;
    info!("synth running at {} Hz", audio.sample_rate);

    let midi = match &cli.midi {
        Some(name) => Some(open_midi(name)?),
        None => None,
    };

    let socket = UdpSocket::bind(("0.0.0.0", cli.port))?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;
    info!("listening for OSC on udp/{}", cli.port);

    let mut bridge = ControlBridge::new(
        to_audio_w,
        to_ctl_r,
        UdpTransport {
            socket: socket.try_clone()?,
        },
    );

    let mut buf = [0u8; 2048];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, addr)) => bridge.on_inbound(&buf[..n], &addr.to_string()),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(e) => {
                warn!("socket receive failed: {e}");
                break;
            }
        }

        if let Some((_, rx)) = &midi {
            for event in rx.try_iter() {
                bridge.send_midi(&event);
            }
        }

        if !bridge.drain_outbound() {
            break;
        }
    }

    info!("shutting down");
    drop(midi);
    drop(audio);
    Ok(())
}
