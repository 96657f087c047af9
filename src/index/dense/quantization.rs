//! Scalar quantization for dense vector storage.
//!
//! Vectors are compressed at insertion time into fixed-width integer
//! codes over a fixed value range, trading recall for memory. The range
//! comes either from explicit scalar configuration or from sampling the
//! first `sample_size` inserted vectors (auto mode). Once fixed, the
//! quantizer is immutable for the index's lifetime.

use serde::{Deserialize, Serialize};

/// Storage data type for quantized components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizedKind {
    /// One byte per component (255 buckets).
    U8,
    /// Two bytes per component (65535 buckets).
    U16,
}

impl QuantizedKind {
    /// Bytes used per vector component.
    #[inline]
    pub const fn bytes_per_component(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
        }
    }

    #[inline]
    const fn levels(&self) -> u32 {
        match self {
            Self::U8 => u8::MAX as u32,
            Self::U16 => u16::MAX as u32,
        }
    }
}

/// Quantization mode for a dense index, fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QuantizationMode {
    /// Store raw f32 components; no compression.
    None,
    /// Sample the first `sample_size` inserted vectors, then freeze the
    /// observed value range and quantize everything (u8 storage).
    Auto {
        /// Number of vectors sampled before the range is frozen.
        sample_size: usize,
    },
    /// Explicit storage type and value range.
    Scalar {
        /// Storage data type for the codes.
        kind: QuantizedKind,
        /// Inclusive (min, max) value range; out-of-range components are
        /// clamped at encode time.
        range: (f32, f32),
    },
}

/// Encoder/decoder over a fixed value range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarQuantizer {
    kind: QuantizedKind,
    min: f32,
    scale: f32, // (max - min) / levels; 0 for a degenerate range
}

impl ScalarQuantizer {
    /// Creates a quantizer over the inclusive `[min, max]` range.
    pub fn new(kind: QuantizedKind, range: (f32, f32)) -> Self {
        let (min, max) = range;
        let span = max - min;
        let scale = if span > 0.0 {
            span / kind.levels() as f32
        } else {
            0.0
        };
        Self { kind, min, scale }
    }

    /// Derives a quantizer from sampled raw components (auto mode).
    /// Falls back to [-1, 1] when the sample is empty.
    pub fn from_samples(kind: QuantizedKind, samples: &[f32]) -> Self {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in samples {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        if min > max {
            (min, max) = (-1.0, 1.0);
        }
        Self::new(kind, (min, max))
    }

    /// Returns the (min, max) range this quantizer was fixed to.
    pub fn range(&self) -> (f32, f32) {
        (
            self.min,
            self.min + self.scale * self.kind.levels() as f32,
        )
    }

    /// Returns the storage data type.
    pub fn kind(&self) -> QuantizedKind {
        self.kind
    }

    /// Encodes raw components, appending codes to `out`.
    pub fn encode_into(&self, values: &[f32], out: &mut Vec<u8>) {
        let levels = self.kind.levels() as f32;
        for &v in values {
            let code = if self.scale > 0.0 {
                (((v - self.min) / self.scale).round().clamp(0.0, levels)) as u32
            } else {
                0
            };
            match self.kind {
                QuantizedKind::U8 => out.push(code as u8),
                QuantizedKind::U16 => out.extend_from_slice(&(code as u16).to_le_bytes()),
            }
        }
    }

    /// Decodes `out.len()` components from `codes` into `out`.
    pub fn decode_into(&self, codes: &[u8], out: &mut [f32]) {
        match self.kind {
            QuantizedKind::U8 => {
                for (slot, &code) in out.iter_mut().zip(codes) {
                    *slot = self.min + code as f32 * self.scale;
                }
            }
            QuantizedKind::U16 => {
                for (slot, chunk) in out.iter_mut().zip(codes.chunks_exact(2)) {
                    let code = u16::from_le_bytes([chunk[0], chunk[1]]);
                    *slot = self.min + code as f32 * self.scale;
                }
            }
        }
    }
}

/// Component storage arena for a dense index: raw f32 while unquantized
/// (or still sampling in auto mode), integer codes once a quantizer is
/// fixed. Indexed by graph slot; tombstoned slots keep their bytes.
#[derive(Debug)]
pub(crate) enum VectorStore {
    /// Raw f32 arena.
    Raw(Vec<f32>),
    /// Quantized code arena.
    Quantized {
        codes: Vec<u8>,
        quantizer: ScalarQuantizer,
    },
}

impl VectorStore {
    /// Appends one vector at the next slot.
    pub fn push(&mut self, values: &[f32]) {
        match self {
            Self::Raw(data) => data.extend_from_slice(values),
            Self::Quantized { codes, quantizer } => quantizer.encode_into(values, codes),
        }
    }

    /// Copies the vector at `slot` into `out` (decoding if quantized).
    pub fn load_into(&self, slot: u32, dimension: usize, out: &mut [f32]) {
        let idx = slot as usize;
        match self {
            Self::Raw(data) => {
                out.copy_from_slice(&data[idx * dimension..(idx + 1) * dimension]);
            }
            Self::Quantized { codes, quantizer } => {
                let width = quantizer.kind().bytes_per_component();
                let start = idx * dimension * width;
                quantizer.decode_into(&codes[start..start + dimension * width], out);
            }
        }
    }

    /// Returns the raw slice for `slot` when no decoding is needed.
    pub fn raw_slice(&self, slot: u32, dimension: usize) -> Option<&[f32]> {
        match self {
            Self::Raw(data) => {
                let idx = slot as usize;
                Some(&data[idx * dimension..(idx + 1) * dimension])
            }
            Self::Quantized { .. } => None,
        }
    }

    /// Freezes an auto-mode arena: derives the quantizer from everything
    /// stored so far and re-encodes in place. Returns the frozen range.
    pub fn freeze(&mut self, dimension: usize) -> (f32, f32) {
        let Self::Raw(data) = self else {
            // Already quantized; freezing twice is a logic error upstream.
            unreachable!("freeze called on a quantized arena");
        };
        let quantizer = ScalarQuantizer::from_samples(QuantizedKind::U8, data);
        let mut codes = Vec::with_capacity(data.len());
        for chunk in data.chunks_exact(dimension) {
            quantizer.encode_into(chunk, &mut codes);
        }
        let range = quantizer.range();
        *self = Self::Quantized { codes, quantizer };
        range
    }

    /// Returns true if components are stored as integer codes.
    pub fn is_quantized(&self) -> bool {
        matches!(self, Self::Quantized { .. })
    }
}
