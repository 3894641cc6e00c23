//! Element type system for numeric buffers
//!
//! Buffers are parametric over a closed set of fixed-width numeric kinds.
//! Cross-type views are produced by an explicit, checked value conversion
//! (`convert_slice`) rather than a byte-level reinterpretation, so a
//! conversion between element widths always materializes a new store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BufferError, Result};

/// Buffer element data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
}

impl Dtype {
    /// Size of one element in bytes
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::F32 | Self::I32 => 4,
            Self::F64 | Self::I64 => 8,
            Self::I16 => 2,
            Self::I8 | Self::U8 => 1,
        }
    }

    /// Canonical dtype name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
        }
    }

    /// Whether the dtype is a floating point kind
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float32" | "f32" => Ok(Self::F32),
            "float64" | "f64" => Ok(Self::F64),
            "int8" | "i8" => Ok(Self::I8),
            "int16" | "i16" => Ok(Self::I16),
            "int32" | "i32" => Ok(Self::I32),
            "int64" | "i64" => Ok(Self::I64),
            "uint8" | "u8" => Ok(Self::U8),
            _ => Err(format!("unknown dtype: {s}")),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for i8 {}
    impl Sealed for i16 {}
    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for u8 {}
}

/// A buffer element: one of the closed set of supported numeric kinds
///
/// The trait is sealed; the supported kinds are exactly the variants of
/// [`Dtype`]. Conversion between kinds is routed through `f64`, matching the
/// widest supported precision.
pub trait Element:
    sealed::Sealed
    + Copy
    + PartialEq
    + PartialOrd
    + std::fmt::Debug
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    /// Dtype tag for this element kind
    const DTYPE: Dtype;

    /// Additive identity
    fn zero() -> Self;

    /// Widen to f64
    fn to_f64(self) -> f64;

    /// Narrow from f64, saturating at the type bounds
    fn from_f64(value: f64) -> Self;

    /// Narrow from f64, rejecting values the type cannot represent
    fn checked_from_f64(value: f64) -> Option<Self>;
}

macro_rules! impl_float_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            #[inline]
            fn zero() -> Self {
                0.0
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            #[inline]
            fn checked_from_f64(value: f64) -> Option<Self> {
                Some(value as $ty)
            }
        }
    };
}

macro_rules! impl_int_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                // `as` casts from float to int saturate and map NaN to 0
                value as $ty
            }

            #[inline]
            fn checked_from_f64(value: f64) -> Option<Self> {
                if !value.is_finite() {
                    return None;
                }
                let truncated = value.trunc();
                if truncated < <$ty>::MIN as f64 || truncated > <$ty>::MAX as f64 {
                    return None;
                }
                Some(truncated as $ty)
            }
        }
    };
}

impl_float_element!(f32, Dtype::F32);
impl_float_element!(f64, Dtype::F64);
impl_int_element!(i8, Dtype::I8);
impl_int_element!(i16, Dtype::I16);
impl_int_element!(i32, Dtype::I32);
impl_int_element!(i64, Dtype::I64);
impl_int_element!(u8, Dtype::U8);

/// Convert a slice of one element kind into another
///
/// Values travel through `f64`. Conversions that the target kind cannot
/// represent (non-finite or out-of-range values into an integer kind) fail
/// with [`BufferError::Unrepresentable`].
pub fn convert_slice<T: Element, U: Element>(source: &[T]) -> Result<Vec<U>> {
    source
        .iter()
        .map(|&value| {
            let wide = value.to_f64();
            U::checked_from_f64(wide).ok_or(BufferError::Unrepresentable {
                value: wide,
                from: T::DTYPE,
                to: U::DTYPE,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(Dtype::F32.size_bytes(), 4);
        assert_eq!(Dtype::F64.size_bytes(), 8);
        assert_eq!(Dtype::I16.size_bytes(), 2);
        assert_eq!(Dtype::U8.size_bytes(), 1);
    }

    #[test]
    fn test_dtype_parse_roundtrip() {
        for dtype in [
            Dtype::F32,
            Dtype::F64,
            Dtype::I8,
            Dtype::I16,
            Dtype::I32,
            Dtype::I64,
            Dtype::U8,
        ] {
            assert_eq!(Dtype::from_str(dtype.name()).unwrap(), dtype);
        }
        assert!(Dtype::from_str("complex128").is_err());
    }

    #[test]
    fn test_convert_float_to_int() {
        let values: Vec<f64> = vec![1.9, -2.1, 3.0];
        let converted: Vec<i32> = convert_slice(&values).unwrap();
        assert_eq!(converted, vec![1, -2, 3]);
    }

    #[test]
    fn test_convert_widening() {
        let values: Vec<i32> = vec![1, 2, 3];
        let converted: Vec<f64> = convert_slice(&values).unwrap();
        assert_eq!(converted, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_convert_rejects_out_of_range() {
        let values: Vec<f64> = vec![300.0];
        let result: Result<Vec<u8>> = convert_slice(&values);
        assert!(matches!(
            result,
            Err(BufferError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn test_convert_rejects_nan_into_int() {
        let values: Vec<f64> = vec![f64::NAN];
        let result: Result<Vec<i64>> = convert_slice(&values);
        assert!(result.is_err());
    }

    #[test]
    fn test_nan_passes_into_float() {
        let values: Vec<f64> = vec![f64::NAN];
        let converted: Vec<f32> = convert_slice(&values).unwrap();
        assert!(converted[0].is_nan());
    }
}
