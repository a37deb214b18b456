//! # Audio Device Module
//!
//! This module owns every direct interaction with CPAL (Cross-Platform Audio
//! Library): selecting devices, negotiating stream formats, and building the
//! input stream for the tuner and the output stream for the click track.
//!
//! ## Features
//! - Default device selection with descriptive errors
//! - f32 stream negotiation, mono preferred, multichannel input downmixed
//! - Fixed-size frame assembly for the pitch detector
//! - Sample-counting output callback that doubles as the audio clock

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::{Receiver, Sender};

use crate::click::{ClickRenderer, ScheduledClick};
use crate::error::{EngineError, EngineResult};

/// Messages from the scheduler to the output callback.
#[derive(Debug, Clone, Copy)]
pub enum RenderCommand {
    Click(ScheduledClick),
    /// Drop every click that has not finished sounding
    Clear,
}

/// Starts audio capture from the default input device.
///
/// Samples are downmixed to mono and grouped into frames of exactly
/// `frame_size` samples. Frames are dropped, not queued without bound, when
/// the consumer falls behind.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running input stream and its sample rate
/// * `Err(e)` - No device, no usable format, or the stream failed to start
pub fn start_audio_capture(
    frame_size: usize,
    preferred_rate: u32,
    sender: Sender<Vec<f32>>,
) -> EngineResult<(cpal::Stream, u32)> {
    if frame_size == 0 {
        return Err(EngineError::UnsupportedConfig("frame size must be positive".to_string()));
    }

    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(EngineError::NoInputDevice)?;

    log::info!(
        "Using audio input device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let configs = device
        .supported_input_configs()
        .map_err(|e| EngineError::UnsupportedConfig(e.to_string()))?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, preferred_rate, 1)
        .ok_or_else(|| EngineError::UnsupportedConfig("no f32 input format".to_string()))?;

    let rate = preferred_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels().max(1) as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!("Input stream: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = |err| log::error!("An error occurred on the input stream: {}", err);

    // Accumulates mono samples until a whole frame is available.
    let mut pending = Vec::with_capacity(frame_size * 2);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if channels == 1 {
                    pending.extend_from_slice(data);
                } else {
                    pending.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                }

                while pending.len() >= frame_size {
                    let frame = pending[..frame_size].to_vec();
                    // A full queue means analysis is behind; skip this frame.
                    let _ = sender.try_send(frame);
                    pending.drain(..frame_size);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| EngineError::Stream(e.to_string()))?;

    stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Starts the click output stream on the default output device.
///
/// The callback advances `frames_rendered` by the number of frames it writes,
/// which gives the engine a sample-accurate clock.
pub fn start_click_output(
    click_duration_secs: f32,
    frames_rendered: Arc<AtomicU64>,
    commands: Receiver<RenderCommand>,
) -> EngineResult<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(EngineError::NoOutputDevice)?;

    log::info!(
        "Using audio output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    // The device default decides rate and layout; the format must be f32.
    let default_config = device
        .default_output_config()
        .map_err(|e| EngineError::UnsupportedConfig(e.to_string()))?;
    let target_rate = default_config.sample_rate().0;
    let configs = device
        .supported_output_configs()
        .map_err(|e| EngineError::UnsupportedConfig(e.to_string()))?
        .collect::<Vec<_>>();
    let range = find_supported_config(configs, target_rate, default_config.channels())
        .ok_or_else(|| EngineError::UnsupportedConfig("no f32 output format".to_string()))?;
    let rate = target_rate.clamp(range.min_sample_rate().0, range.max_sample_rate().0);
    let supported_config = range.with_sample_rate(cpal::SampleRate(rate));

    let sample_rate = supported_config.sample_rate().0;
    let channels = supported_config.channels().max(1) as usize;
    let config: cpal::StreamConfig = supported_config.into();

    log::info!("Output stream: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = |err| log::error!("An error occurred on the output stream: {}", err);
    let mut renderer = ClickRenderer::new(sample_rate, click_duration_secs);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let first_frame = frames_rendered.load(Ordering::Acquire);
                while let Ok(command) = commands.try_recv() {
                    match command {
                        RenderCommand::Click(click) => renderer.schedule(click, first_frame),
                        RenderCommand::Clear => renderer.clear(),
                    }
                }
                renderer.render(data, channels, first_frame);
                frames_rendered.fetch_add((data.len() / channels) as u64, Ordering::Release);
            },
            err_fn,
            None,
        )
        .map_err(|e| EngineError::Stream(e.to_string()))?;

    stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;

    Ok((stream, sample_rate))
}

/// Picks the f32 configuration closest to the target sample rate.
///
/// At equal rate distance the channel count closest to `target_channels`
/// wins: mono for capture, the device layout for playback.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
    target_channels: u16,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_distance = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (rate_distance, c.channels().abs_diff(target_channels))
        })
}
