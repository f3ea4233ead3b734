//! Round payloads and their wire encoding.
//!
//! A payload is an ordered list of [`Tensor`]s. Tensors hold either `f64` values or strings
//! embedded in a fixed-width UTF-32 encoding: every string of a tensor occupies `width` code
//! points along the last axis, padded with `\0`. String content thus travels as plain
//! numeric arrays.
//!
//! The typed record sets exchanged during a round ([`TransactionKeys`], [`Membership`] and
//! [`Scores`](crate::model::Scores)) are converted to and from [`Parameters`] in the
//! [`records`] module.

pub mod records;

use ndarray::{prelude::*, ShapeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::records::{Membership, TransactionKeys};

/// Errors raised while encoding or decoding a payload.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("expected {expected} blocks in payload, found {found}")]
    BlockCount { expected: usize, found: usize },

    #[error("invalid tensor shape: {0}")]
    Shape(#[from] ShapeError),

    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("expected a {expected} tensor")]
    DataType { expected: &'static str },

    #[error("index has {index} entries but the value matrix has {rows} rows")]
    LengthMismatch { index: usize, rows: usize },

    #[error("duplicate index value {0:?}")]
    DuplicateIndex(String),

    #[error("invalid label {0:?}")]
    InvalidLabel(String),

    #[error("invalid code point {0:#x}")]
    InvalidCodePoint(u32),

    #[error("wire codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// A block of a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tensor {
    F64(Array1<f64>),
    /// Fixed-width UTF-32 strings. The last axis holds the code points of each string.
    Str(ArrayD<u32>),
}

impl Tensor {
    /// Creates a one-dimensional `f64` tensor.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Tensor::F64(Array1::from(values))
    }

    /// Creates a string tensor of the given shape.
    ///
    /// The width of the tensor is the length (in chars) of its longest string, and at
    /// least `1`.
    ///
    /// # Errors
    /// Fails if the number of values doesn't match the shape.
    pub fn from_strings<S: AsRef<str>>(
        mut shape: Vec<usize>,
        values: &[S],
    ) -> Result<Self, PayloadError> {
        let width = values
            .iter()
            .map(|value| value.as_ref().chars().count())
            .max()
            .unwrap_or(0)
            .max(1);
        let mut code_points = Vec::with_capacity(width * values.len());
        for value in values {
            let start = code_points.len();
            code_points.extend(value.as_ref().chars().map(u32::from));
            code_points.resize(start + width, 0);
        }
        shape.push(width);
        Ok(Tensor::Str(ArrayD::from_shape_vec(shape, code_points)?))
    }

    /// The shape of the tensor. The code point axis of string tensors is not included.
    pub fn shape(&self) -> &[usize] {
        match self {
            Tensor::F64(values) => values.shape(),
            Tensor::Str(code_points) => code_points
                .shape()
                .split_last()
                .map_or(&[][..], |(_, shape)| shape),
        }
    }

    fn code_points(&self) -> Result<ArrayViewD<'_, u32>, PayloadError> {
        match self {
            Tensor::Str(code_points) => Ok(code_points.view()),
            Tensor::F64(_) => Err(PayloadError::DataType { expected: "string" }),
        }
    }

    /// Decodes a vector of strings.
    ///
    /// # Errors
    /// Fails if this is not a one-dimensional string tensor or if it holds invalid code
    /// points.
    pub fn to_strings(&self) -> Result<Vec<String>, PayloadError> {
        self.code_points()?
            .into_dimensionality::<Ix2>()?
            .rows()
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Decodes a matrix of strings.
    ///
    /// # Errors
    /// Fails if this is not a two-dimensional string tensor or if it holds invalid code
    /// points.
    pub fn to_string_matrix(&self) -> Result<Array2<String>, PayloadError> {
        let code_points = self.code_points()?.into_dimensionality::<Ix3>()?;
        let (rows, columns, _) = code_points.dim();
        let strings = code_points
            .lanes(Axis(2))
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Array2::from_shape_vec((rows, columns), strings)?)
    }

    /// Returns the values of an `f64` tensor.
    pub fn to_f64(&self) -> Result<&Array1<f64>, PayloadError> {
        match self {
            Tensor::F64(values) => Ok(values),
            Tensor::Str(_) => Err(PayloadError::DataType { expected: "f64" }),
        }
    }
}

/// Decodes a fixed-width string, stripping the trailing `\0`s.
fn decode(code_points: ArrayView1<'_, u32>) -> Result<String, PayloadError> {
    let end = code_points
        .iter()
        .rposition(|&c| c != 0)
        .map_or(0, |pos| pos + 1);
    code_points
        .iter()
        .take(end)
        .map(|&c| std::char::from_u32(c).ok_or(PayloadError::InvalidCodePoint(c)))
        .collect()
}

/// The payload of a round message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    tensors: Vec<Tensor>,
}

impl Parameters {
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    /// An empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Serializes the payload for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PayloadError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes a payload received from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PayloadError> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Returns the tensors of this payload, checking there are exactly `N`.
    pub(crate) fn blocks<const N: usize>(&self) -> Result<[&Tensor; N], PayloadError> {
        if self.tensors.len() != N {
            return Err(PayloadError::BlockCount {
                expected: N,
                found: self.tensors.len(),
            });
        }
        Ok(std::array::from_fn(|i| &self.tensors[i]))
    }
}
