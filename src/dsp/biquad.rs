use crate::dsp::coefficients::Coefficients;

/// Direct Form I second-order filter.
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
/// ```
///
/// Coefficients can be swapped between blocks without touching the delay
/// registers; the resulting small transient is expected.
#[derive(Debug, Clone, Default)]
pub struct IirFilter {
    coeffs: Coefficients,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl IirFilter {
    pub fn new(coeffs: Coefficients) -> Self {
        Self {
            coeffs,
            ..Self::default()
        }
    }

    pub const fn coefficients(&self) -> &Coefficients {
        &self.coeffs
    }

    pub const fn set_coefficients(&mut self, coeffs: Coefficients) {
        self.coeffs = coeffs;
    }

    /// Zero the delay registers.
    pub const fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let c = &self.coeffs;
        let output = c.b0.mul_add(
            input,
            c.b1.mul_add(
                self.x1,
                c.b2.mul_add(self.x2, (-c.a1).mul_add(self.y1, -c.a2 * self.y2)),
            ),
        );

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Filters `block` in place.
    pub fn process(&mut self, block: &mut [f32]) {
        for sample in block.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Filters `input` into `output`, leaving `input` untouched.
    ///
    /// Processes `min(input.len(), output.len())` samples.
    pub fn process_into(&mut self, input: &[f32], output: &mut [f32]) {
        for (out, &x) in output.iter_mut().zip(input) {
            *out = self.process_sample(x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::bilinear::AnalogPrototype;
    use std::f64::consts::PI;

    fn highpass(cutoff: f64, sample_rate: f64) -> IirFilter {
        let tau = 1.0 / (2.0 * PI * cutoff);
        let proto = AnalogPrototype::new([0.0, tau, 0.0], [0.0, tau, 1.0]);
        IirFilter::new(proto.bilinear(sample_rate).unwrap())
    }

    #[test]
    fn identity_is_passthrough() {
        let mut filter = IirFilter::default();
        let mut block = [1.0, -0.5, 0.25, 0.0];
        filter.process(&mut block);
        assert_eq!(block, [1.0, -0.5, 0.25, 0.0]);
    }

    #[test]
    fn highpass_blocks_dc_and_passes_high_frequencies() {
        let sr = 48_000.0;

        // ---------- DC rejection ----------
        let mut hp = highpass(1_000.0, sr);
        let mut warmup = [1.0f32; 512];
        hp.process(&mut warmup);

        let mut dc = [1.0f32; 256];
        hp.process(&mut dc);
        let dc_avg = dc.iter().sum::<f32>() / dc.len() as f32;
        assert!(
            dc_avg.abs() < 1e-3,
            "DC not attenuated enough after warm-up: avg={dc_avg}"
        );

        // ---------- High-frequency passthrough ----------
        let mut hp = highpass(1_000.0, sr);
        let mut square: Vec<f32> = (0..320)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        hp.process(&mut square);
        let hf_avg_abs = square[64..].iter().map(|s| s.abs()).sum::<f32>() / 256.0;
        assert!(
            hf_avg_abs > 0.9,
            "High-frequency attenuated too much: avg_abs={hf_avg_abs}"
        );
    }

    #[test]
    fn process_into_matches_in_place() {
        let coeffs = Coefficients::new(0.2, 0.3, 0.1, -0.4, 0.1);
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();

        let mut a = IirFilter::new(coeffs);
        let mut in_place = input.clone();
        a.process(&mut in_place);

        let mut b = IirFilter::new(coeffs);
        let mut output = vec![0.0; input.len()];
        b.process_into(&input, &mut output);

        assert_eq!(in_place, output);
        assert_eq!(input[5], (5.0f32 * 0.3).sin(), "input must be untouched");
    }

    #[test]
    fn coefficient_swap_keeps_state_and_reset_clears_it() {
        let mut filter = IirFilter::new(Coefficients::new(0.5, 0.0, 0.0, -0.5, 0.0));
        let mut block = [1.0f32; 16];
        filter.process(&mut block);

        filter.set_coefficients(Coefficients::new(0.0, 0.0, 0.0, -0.5, 0.0));
        // Zero feed-forward: output is purely the decaying feedback of the old state.
        assert!(filter.process_sample(0.0) > 0.0);

        filter.reset();
        assert_eq!(filter.process_sample(0.0), 0.0);
    }
}
