use anyhow::{Context, Result, bail};
use log::debug;
use rubato::{FftFixedInOut, ResampleError, Resampler};

const CHANNELS: usize = 1;

/// Ratios the oversampler accepts.
pub const SUPPORTED_FACTORS: [usize; 4] = [1, 2, 4, 8];

/// Streams host blocks of any length through a fixed-chunk resampler pair.
///
/// With a factor of 1 the callback runs directly on the host block. Above 1,
/// samples are collected into a chunk of `chunk_size` frames; once full it is
/// upsampled, handed to the callback at the higher rate and downsampled into
/// the buffer the next chunk's output is read from. This costs one chunk of
/// latency plus the resampler's own delay, see [`Oversampler::latency`].
pub struct Oversampler {
    factor: usize,
    chunk_size: usize,
    inner: Option<ResamplerPair>,
}

struct ResamplerPair {
    upsampler: FftFixedInOut<f32>,
    downsampler: FftFixedInOut<f32>,
    input_buffer: Vec<Vec<f32>>,
    upsampled_buffer: Vec<Vec<f32>>,
    downsampled_buffer: Vec<Vec<f32>>,
    position: usize,
}

impl Oversampler {
    pub fn new(factor: usize, sample_rate: usize, chunk_size: usize) -> Result<Self> {
        if !SUPPORTED_FACTORS.contains(&factor) {
            bail!("unsupported oversampling factor {factor}, expected one of {SUPPORTED_FACTORS:?}");
        }
        if sample_rate == 0 || chunk_size == 0 {
            bail!("oversampler needs a positive sample rate and chunk size");
        }

        if factor == 1 {
            return Ok(Self {
                factor,
                chunk_size,
                inner: None,
            });
        }

        let upsampler = FftFixedInOut::new(sample_rate, sample_rate * factor, chunk_size, CHANNELS)
            .context("failed to create upsampler")?;
        let chunk_in = upsampler.input_frames_next();
        let chunk_up = upsampler.output_frames_next();

        let downsampler = FftFixedInOut::new(sample_rate * factor, sample_rate, chunk_up, CHANNELS)
            .context("failed to create downsampler")?;

        if downsampler.input_frames_next() != chunk_up
            || downsampler.output_frames_next() != chunk_in
        {
            bail!(
                "resampler chunk sizes do not line up: up {}→{}, down {}→{}",
                chunk_in,
                chunk_up,
                downsampler.input_frames_next(),
                downsampler.output_frames_next()
            );
        }

        debug!(
            "Oversampler {factor}x at {sample_rate} Hz: chunk {chunk_in} frames ({chunk_up} oversampled)"
        );

        let input_buffer = upsampler.input_buffer_allocate(true);
        let upsampled_buffer = upsampler.output_buffer_allocate(true);
        let downsampled_buffer = downsampler.output_buffer_allocate(true);

        Ok(Self {
            factor,
            chunk_size: chunk_in,
            inner: Some(ResamplerPair {
                upsampler,
                downsampler,
                input_buffer,
                upsampled_buffer,
                downsampled_buffer,
                position: 0,
            }),
        })
    }

    pub const fn factor(&self) -> usize {
        self.factor
    }

    /// Frames per internal chunk at the base rate.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Longest slice the callback of [`Oversampler::process`] can receive
    /// when fed blocks of at most `max_block` frames.
    pub fn max_callback_len(&self, max_block: usize) -> usize {
        match &self.inner {
            Some(pair) => pair.upsampled_buffer[0].len(),
            None => max_block,
        }
    }

    /// Delay in base-rate frames between input and output.
    pub fn latency(&self) -> usize {
        match &self.inner {
            Some(pair) => {
                let up_delay = pair.upsampler.output_delay();
                let down_delay = pair.downsampler.output_delay();
                self.chunk_size + (up_delay + self.factor - 1) / self.factor + down_delay
            }
            None => 0,
        }
    }

    /// Clears the chunk FIFO and the resampler histories.
    pub fn reset(&mut self) {
        if let Some(pair) = self.inner.as_mut() {
            pair.upsampler.reset();
            pair.downsampler.reset();
            pair.input_buffer[0].fill(0.0);
            pair.upsampled_buffer[0].fill(0.0);
            pair.downsampled_buffer[0].fill(0.0);
            pair.position = 0;
        }
    }

    /// Runs `f` at the oversampled rate over the contents of `block`, in place.
    ///
    /// Does not allocate. Errors come straight from the resamplers.
    pub fn process<F>(&mut self, block: &mut [f32], mut f: F) -> Result<(), ResampleError>
    where
        F: FnMut(&mut [f32]),
    {
        let Some(pair) = self.inner.as_mut() else {
            f(block);
            return Ok(());
        };

        let chunk = self.chunk_size;
        let mut offset = 0;
        while offset < block.len() {
            let pos = pair.position;
            let n = (chunk - pos).min(block.len() - offset);
            let span = &mut block[offset..offset + n];

            pair.input_buffer[0][pos..pos + n].copy_from_slice(span);
            span.copy_from_slice(&pair.downsampled_buffer[0][pos..pos + n]);

            pair.position += n;
            offset += n;

            if pair.position == chunk {
                pair.position = 0;

                pair.upsampler.process_into_buffer(
                    &pair.input_buffer,
                    &mut pair.upsampled_buffer,
                    None,
                )?;

                f(&mut pair.upsampled_buffer[0]);

                pair.downsampler.process_into_buffer(
                    &pair.upsampled_buffer,
                    &mut pair.downsampled_buffer,
                    None,
                )?;
            }
        }

        Ok(())
    }
}
