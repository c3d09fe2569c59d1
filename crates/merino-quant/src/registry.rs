//! Tensor decoder registry
//!
//! Decouples "which bytes represent which tensor" from "how to decode
//! bytes of scheme T". The importer and the native loader dispatch here
//! by raw tag; adding a scheme means registering one more decoder, not
//! editing a central match.

use tracing::warn;

use crate::codec;
use crate::error::{QuantError, Result};
use crate::scheme::Scheme;

/// Shape and identity of a tensor being decoded
#[derive(Debug, Clone)]
pub struct TensorShape {
    /// Tensor name, used in error reports
    pub name: String,
    /// Dimensions, innermost last
    pub dims: Vec<usize>,
}

impl TensorShape {
    /// Build a shape record
    pub fn new(name: impl Into<String>, dims: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            dims,
        }
    }

    /// Total element count
    pub fn n_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Elements per quantized row
    pub fn row_len(&self) -> usize {
        self.dims.last().copied().unwrap_or(0)
    }

    /// Number of quantized rows
    pub fn n_rows(&self) -> usize {
        if self.dims.is_empty() {
            0
        } else {
            self.dims[..self.dims.len() - 1].iter().product()
        }
    }
}

/// A decoder able to turn packed bytes of one scheme into floats
pub trait TensorDecoder: Send + Sync {
    /// The scheme this decoder produces
    fn scheme(&self) -> Scheme;

    /// Whether this decoder claims the raw tag
    fn can_decode(&self, tag: u32) -> bool {
        self.scheme().tag() == tag
    }

    /// Decode a whole tensor's bytes into its float sequence
    fn decode(&self, info: &TensorShape, data: &[u8]) -> Result<Vec<f32>>;
}

/// Decoder for any scheme with a registered block codec
struct SchemeDecoder {
    scheme: Scheme,
}

impl TensorDecoder for SchemeDecoder {
    fn scheme(&self) -> Scheme {
        self.scheme
    }

    fn decode(&self, info: &TensorShape, data: &[u8]) -> Result<Vec<f32>> {
        let row_len = info.row_len();
        let n_rows = info.n_rows();
        let row_bytes = self.scheme.row_bytes(row_len);
        if data.len() != n_rows * row_bytes {
            return Err(QuantError::MalformedBlock {
                name: info.name.clone(),
                scheme: self.scheme.name(),
                expected: n_rows * row_bytes,
                found: data.len(),
            });
        }
        let mut out = Vec::with_capacity(info.n_elements());
        for row in 0..n_rows {
            let bytes = &data[row * row_bytes..(row + 1) * row_bytes];
            out.extend_from_slice(&codec::dequantize(self.scheme, bytes, row_len)?);
        }
        Ok(out)
    }
}

/// Ordered decoder lookup, first registered claimant wins
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn TensorDecoder>>,
}

impl DecoderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// A registry with one decoder per supported scheme
    pub fn with_default_decoders() -> Self {
        let mut registry = Self::new();
        for &scheme in Scheme::all() {
            registry.register(Box::new(SchemeDecoder { scheme }));
        }
        registry
    }

    /// Register a decoder. Overlapping claims are a caller error; the
    /// first registration keeps winning, and the overlap is logged.
    pub fn register(&mut self, decoder: Box<dyn TensorDecoder>) {
        let tag = decoder.scheme().tag();
        if self.decoders.iter().any(|d| d.can_decode(tag)) {
            warn!(tag, "decoder registered for an already-claimed tag; first registration wins");
        }
        self.decoders.push(decoder);
    }

    /// Whether any registered decoder claims the tag
    pub fn supports(&self, tag: u32) -> bool {
        self.decoders.iter().any(|d| d.can_decode(tag))
    }

    /// Tags claimed by registered decoders, in registration order
    pub fn supported_tags(&self) -> Vec<u32> {
        self.decoders.iter().map(|d| d.scheme().tag()).collect()
    }

    /// Decode a tensor by raw tag.
    ///
    /// Fails with `UnsupportedScheme` carrying the offending tag when no
    /// registered decoder claims it.
    pub fn decode(&self, tag: u32, info: &TensorShape, data: &[u8]) -> Result<Vec<f32>> {
        match self.decoders.iter().find(|d| d.can_decode(tag)) {
            Some(decoder) => decoder.decode(info, data),
            None => Err(QuantError::UnsupportedScheme(tag)),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_default_decoders()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::quantize;

    #[test]
    fn test_default_registry_covers_all_schemes() {
        let registry = DecoderRegistry::with_default_decoders();
        for &scheme in Scheme::all() {
            assert!(registry.supports(scheme.tag()), "{scheme}");
        }
        assert_eq!(registry.supported_tags().len(), Scheme::all().len());
    }

    #[test]
    fn test_unregistered_tag_is_typed_error() {
        let registry = DecoderRegistry::with_default_decoders();
        let info = TensorShape::new("blk.0.ffn_up.weight", vec![32]);
        let err = registry.decode(23, &info, &[]).unwrap_err();
        assert!(matches!(err, QuantError::UnsupportedScheme(23)));
    }

    #[test]
    fn test_decode_round_trip() {
        let registry = DecoderRegistry::with_default_decoders();
        let values: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
        let packed = quantize(Scheme::Q8_0, &values);
        let info = TensorShape::new("token_embd.weight", vec![2, 32]);
        let decoded = registry
            .decode(Scheme::Q8_0.tag(), &info, &packed)
            .unwrap();
        assert_eq!(decoded.len(), 64);
        for (&orig, &dec) in values.iter().zip(decoded.iter()) {
            assert!((orig - dec).abs() < 0.2);
        }
    }

    #[test]
    fn test_first_registration_wins() {
        struct ZeroDecoder;
        impl TensorDecoder for ZeroDecoder {
            fn scheme(&self) -> Scheme {
                Scheme::Q8_0
            }
            fn decode(&self, info: &TensorShape, _data: &[u8]) -> Result<Vec<f32>> {
                Ok(vec![0.0; info.n_elements()])
            }
        }

        let mut registry = DecoderRegistry::new();
        registry.register(Box::new(ZeroDecoder));
        registry.register(Box::new(SchemeDecoder {
            scheme: Scheme::Q8_0,
        }));

        let info = TensorShape::new("t", vec![32]);
        let values = vec![1.0f32; 32];
        let packed = quantize(Scheme::Q8_0, &values);
        let decoded = registry.decode(8, &info, &packed).unwrap();
        assert!(decoded.iter().all(|&v| v == 0.0));
    }
}
