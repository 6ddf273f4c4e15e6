//! Offline rendering of WAV files through a [`Pedal`].

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pedal::{Pedal, ProcessSpec};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderSummary {
    pub frames: usize,
    pub sample_rate: u32,
    pub latency: usize,
    pub peak: f32,
}

/// `<dir>/render_<timestamp>.wav`
pub fn default_output_path(dir: &str) -> PathBuf {
    PathBuf::from(dir).join(format!(
        "render_{}.wav",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// Reads the first channel of a WAV file as `f32` in `-1..=1`.
pub fn read_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels);
    if channels == 0 {
        bail!("WAV file {} has no channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read float samples")?,
        SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .context("failed to read integer samples")?
        }
    };

    let mono = interleaved.iter().step_by(channels).copied().collect();
    debug!(
        "Read {} frames at {} Hz ({} channels) from {:?}",
        interleaved.len() / channels,
        spec.sample_rate,
        channels,
        path
    );

    Ok((mono, spec.sample_rate))
}

/// Writes a stereo pair as 16-bit PCM, clamping to full scale.
pub fn write_stereo(path: &Path, left: &[f32], right: &[f32], sample_rate: u32) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).context("failed to create output directory")?;
    }

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV file {}", path.display()))?;

    for (&l, &r) in left.iter().zip(right) {
        writer.write_sample(to_i16(l))?;
        writer.write_sample(to_i16(r))?;
    }

    writer.finalize().context("failed to finalize WAV file")?;
    Ok(())
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// Prepares `pedal` for `sample_rate` and runs `input` through it in blocks
/// of `block_size`, returning both output channels with the pedal's latency
/// removed.
pub fn process_offline(
    pedal: &mut Pedal,
    input: &[f32],
    sample_rate: u32,
    block_size: usize,
) -> Result<(Vec<f32>, Vec<f32>)> {
    pedal.prepare(ProcessSpec {
        sample_rate: f64::from(sample_rate),
        max_block_size: block_size,
        input_channels: 1,
    })?;

    let latency = pedal.latency_samples();
    let total = input.len() + latency;

    let mut left = Vec::with_capacity(total);
    left.extend_from_slice(input);
    left.resize(total, 0.0);
    let mut right = vec![0.0; total];

    for (l, r) in left.chunks_mut(block_size).zip(right.chunks_mut(block_size)) {
        let mut channels = [l, r];
        pedal.process(&mut channels);
    }

    left.drain(..latency);
    right.drain(..latency);
    Ok((left, right))
}

/// Renders `input` through `pedal` into a 16-bit stereo WAV at `output`.
pub fn render_file(
    pedal: &mut Pedal,
    input: &Path,
    output: &Path,
    block_size: usize,
) -> Result<RenderSummary> {
    let (samples, sample_rate) = read_mono(input)?;
    let (left, right) = process_offline(pedal, &samples, sample_rate, block_size)?;
    write_stereo(output, &left, &right, sample_rate)?;

    let summary = RenderSummary {
        frames: left.len(),
        sample_rate,
        latency: pedal.latency_samples(),
        peak: left.iter().fold(0.0f32, |m, s| m.max(s.abs())),
    };
    info!("Rendered {} frames to {:?} (peak {:.3})", summary.frames, output, summary.peak);

    pedal.release();
    Ok(summary)
}
