//! Merino Quant: block-quantized tensor codecs and fused kernels
//!
//! This crate provides the compressed-weight subsystem of the Merino CPU
//! inference runtime:
//!
//! - **Block codecs**: encode/decode for the GGML-compatible quantized
//!   formats (Q4_0/Q4_1/Q5_0/Q5_1/Q8_0 and the K-quant super-block
//!   formats Q4_K/Q5_K/Q6_K/Q8_K)
//! - **Quantized tensors**: immutable value types binding raw block bytes
//!   to a scheme and shape
//! - **Decoder registry**: pluggable dispatch from a scheme tag to the
//!   codec able to decode it
//! - **Fused matmul**: matrix multiply directly against compressed
//!   weights, one block of scratch at a time
//!
//! # Example
//!
//! ```rust
//! use merino_quant::{Scheme, QuantizedTensor, fused_matmul};
//!
//! let k = 64;
//! let n = 4;
//! let weights: Vec<f32> = (0..n * k).map(|i| (i as f32 * 0.17).sin()).collect();
//! let tensor = QuantizedTensor::quantize(&weights, &[n, k], Scheme::Q8_0)?;
//!
//! let activations = vec![1.0f32; k];
//! let mut out = vec![0.0f32; n];
//! fused_matmul(&activations, &tensor, &mut out, 1, k, n)?;
//! # Ok::<(), merino_quant::QuantError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocks;
pub mod codec;
pub mod error;
pub mod matmul;
pub mod registry;
pub mod scales;
pub mod scheme;
pub mod tensor;

pub use error::{QuantError, Result};
pub use matmul::{fused_matmul, fused_matmul_q8k, fused_matmul_row};
pub use registry::{DecoderRegistry, TensorDecoder, TensorShape};
pub use scheme::Scheme;
pub use tensor::QuantizedTensor;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
