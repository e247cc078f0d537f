//! Typed elements on the wire
//!
//! Buffers exchanged between ranks are slices of a small closed set of
//! plain numeric types, encoded little-endian.

use crate::error::CommError;
use std::fmt;

/// Element type tag carried next to every typed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// `u8`
    U8,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
}

impl ElementType {
    /// Width of one element in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            ElementType::U8 => 1,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }

    /// Rust spelling of the type
    pub fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::I32 => "i32",
            ElementType::I64 => "i64",
            ElementType::U32 => "u32",
            ElementType::U64 => "u64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element-wise reduction applied across ranks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    /// Sum (wrapping for integers)
    Sum,
    /// Product (wrapping for integers)
    Prod,
    /// Minimum
    Min,
    /// Maximum
    Max,
}

impl fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
        }
    }
}

/// A value that can travel between ranks and take part in reductions
pub trait Element: Copy + PartialOrd + fmt::Debug + Send + Sync + 'static {
    /// Runtime tag for this type
    const TYPE: ElementType;

    /// Encode a slice little-endian
    fn encode(values: &[Self]) -> Vec<u8>;

    /// Decode a payload produced by `encode`
    fn decode(bytes: &[u8]) -> Result<Vec<Self>, CommError>;

    /// Combine two values with a built-in reduction
    fn combine(self, other: Self, op: ReduceOp) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $tag:ident, $add:ident, $mul:ident, $min:expr, $max:expr) => {
        impl Element for $ty {
            const TYPE: ElementType = ElementType::$tag;

            fn encode(values: &[Self]) -> Vec<u8> {
                let mut out = Vec::with_capacity(values.len() * std::mem::size_of::<$ty>());
                for value in values {
                    out.extend_from_slice(&value.to_le_bytes());
                }
                out
            }

            fn decode(bytes: &[u8]) -> Result<Vec<Self>, CommError> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                if bytes.len() % WIDTH != 0 {
                    return Err(CommError::Decode {
                        len: bytes.len(),
                        element: Self::TYPE,
                    });
                }
                Ok(bytes
                    .chunks_exact(WIDTH)
                    .map(|chunk| {
                        let mut raw = [0u8; WIDTH];
                        raw.copy_from_slice(chunk);
                        <$ty>::from_le_bytes(raw)
                    })
                    .collect())
            }

            #[inline]
            fn combine(self, other: Self, op: ReduceOp) -> Self {
                let min: fn($ty, $ty) -> $ty = $min;
                let max: fn($ty, $ty) -> $ty = $max;
                match op {
                    ReduceOp::Sum => self.$add(other),
                    ReduceOp::Prod => self.$mul(other),
                    ReduceOp::Min => min(self, other),
                    ReduceOp::Max => max(self, other),
                }
            }
        }
    };
}

macro_rules! impl_int_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(impl_element!($ty, $tag, wrapping_add, wrapping_mul, Ord::min, Ord::max);)*
    };
}

trait FloatArith: Sized {
    fn add(self, other: Self) -> Self;
    fn mul(self, other: Self) -> Self;
}

macro_rules! impl_float_element {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl FloatArith for $ty {
                #[inline]
                fn add(self, other: Self) -> Self {
                    self + other
                }
                #[inline]
                fn mul(self, other: Self) -> Self {
                    self * other
                }
            }
            impl_element!($ty, $tag, add, mul, <$ty>::min, <$ty>::max);
        )*
    };
}

impl_int_element!(u8 => U8, i32 => I32, i64 => I64, u32 => U32, u64 => U64);
impl_float_element!(f32 => F32, f64 => F64);
