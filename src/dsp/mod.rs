pub mod bilinear;
pub mod biquad;
pub mod clipper;
pub mod coefficients;
pub mod oversampler;

pub use bilinear::{AnalogPrototype, BilinearError};
pub use biquad::IirFilter;
pub use clipper::DiodeClipper;
pub use coefficients::{Coefficients, Response};
pub use oversampler::Oversampler;
