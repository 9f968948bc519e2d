//! Real-time audio output using cpal.
//! Works with JACK, ALSA, CoreAudio, WASAPI, etc.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::engine::Engine;

/// Mono frames rendered per engine cycle inside the callback.
const BLOCK: usize = 256;

/// A running output stream. Dropping it tears the stream down; the drop is
/// safe regardless of whether the control loop is still alive.
pub struct AudioOutput {
    pub sample_rate: u32,
    _stream: cpal::Stream,
}

/// Opens the default output device and starts rendering `engine` into it.
pub fn start(mut engine: Engine) -> Result<AudioOutput, Box<dyn std::error::Error>> {
    let host = cpal::default_host();
    info!("audio host: {:?}", host.id());

    let device = host
        .default_output_device()
        .ok_or("no audio output device found")?;
    info!("audio device: {}", device.name()?);

    let config = device.default_output_config()?;
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    engine.set_sample_rate(sample_rate as f32);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), engine, channels),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), engine, channels),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), engine, channels),
        _ => return Err("unsupported sample format".into()),
    }?;

    stream.play()?;
    info!("audio stream started at {} Hz", sample_rate);

    Ok(AudioOutput {
        sample_rate,
        _stream: stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: Engine,
    channels: usize,
) -> Result<cpal::Stream, Box<dyn std::error::Error>>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    // Preallocated mono scratch; the callback chunks into it so nothing
    // allocates no matter how large the device buffer is.
    let mut mono = [0.0f32; BLOCK];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frames in data.chunks_mut(channels * BLOCK) {
                let n = frames.len() / channels;
                engine.process(&mut mono[..n]);
                for (frame, &sample) in frames.chunks_mut(channels).zip(mono.iter()) {
                    for channel in frame.iter_mut() {
                        *channel = T::from_sample(sample);
                    }
                }
            }
        },
        |err| error!("audio stream error: {}", err),
        None,
    )?;

    Ok(stream)
}
