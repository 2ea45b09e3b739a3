//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use std::ops::BitOr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Built-in scalar data types a variable may carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum DataType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            DataType::Boolean | DataType::String | DataType::DateTime
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ValueRank {
    #[default]
    Scalar,
    OneDimension,
    TwoDimensions,
}

impl ValueRank {
    /// Numeric rank as exposed through the attribute service.
    pub fn code(self) -> i32 {
        match self {
            ValueRank::Scalar => -1,
            ValueRank::OneDimension => 1,
            ValueRank::TwoDimensions => 2,
        }
    }

    /// Declared array dimensions; zero means unbounded.
    pub fn array_dimensions(self) -> Vec<u32> {
        match self {
            ValueRank::Scalar => Vec::new(),
            ValueRank::OneDimension => vec![0],
            ValueRank::TwoDimensions => vec![0, 0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variant {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Vec<Variant>),
    Matrix {
        dimensions: Vec<u32>,
        values: Vec<Variant>,
    },
}

impl Variant {
    /// Data type of a scalar value; `None` for arrays and matrices.
    pub fn scalar_type(&self) -> Option<DataType> {
        let data_type = match self {
            Variant::Boolean(_) => DataType::Boolean,
            Variant::SByte(_) => DataType::SByte,
            Variant::Byte(_) => DataType::Byte,
            Variant::Int16(_) => DataType::Int16,
            Variant::UInt16(_) => DataType::UInt16,
            Variant::Int32(_) => DataType::Int32,
            Variant::UInt32(_) => DataType::UInt32,
            Variant::Int64(_) => DataType::Int64,
            Variant::UInt64(_) => DataType::UInt64,
            Variant::Float(_) => DataType::Float,
            Variant::Double(_) => DataType::Double,
            Variant::String(_) => DataType::String,
            Variant::DateTime(_) => DataType::DateTime,
            Variant::Array(_) | Variant::Matrix { .. } => return None,
        };
        Some(data_type)
    }

    pub fn value_rank(&self) -> ValueRank {
        match self {
            Variant::Array(_) => ValueRank::OneDimension,
            Variant::Matrix { .. } => ValueRank::TwoDimensions,
            _ => ValueRank::Scalar,
        }
    }

    /// True when the value has the declared element type and shape.
    pub fn conforms_to(&self, data_type: DataType, value_rank: ValueRank) -> bool {
        let element_ok = |value: &Variant| value.scalar_type() == Some(data_type);
        match (self, value_rank) {
            (Variant::Array(values), ValueRank::OneDimension) => values.iter().all(element_ok),
            (Variant::Matrix { dimensions, values }, ValueRank::TwoDimensions) => {
                dimensions.len() == 2
                    && dimensions.iter().map(|d| *d as usize).product::<usize>() == values.len()
                    && values.iter().all(element_ok)
            }
            (scalar, ValueRank::Scalar) => element_ok(scalar),
            _ => false,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::SByte(v) => Some(f64::from(*v)),
            Variant::Byte(v) => Some(f64::from(*v)),
            Variant::Int16(v) => Some(f64::from(*v)),
            Variant::UInt16(v) => Some(f64::from(*v)),
            Variant::Int32(v) => Some(f64::from(*v)),
            Variant::UInt32(v) => Some(f64::from(*v)),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(f64::from(*v)),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert a floating point sample into a scalar of `data_type`, rounding
    /// and saturating for integer types.
    pub fn from_f64(data_type: DataType, value: f64) -> Option<Variant> {
        let variant = match data_type {
            DataType::SByte => Variant::SByte(value.round() as i8),
            DataType::Byte => Variant::Byte(value.round() as u8),
            DataType::Int16 => Variant::Int16(value.round() as i16),
            DataType::UInt16 => Variant::UInt16(value.round() as u16),
            DataType::Int32 => Variant::Int32(value.round() as i32),
            DataType::UInt32 => Variant::UInt32(value.round() as u32),
            DataType::Int64 => Variant::Int64(value.round() as i64),
            DataType::UInt64 => Variant::UInt64(value.round() as u64),
            DataType::Float => Variant::Float(value as f32),
            DataType::Double => Variant::Double(value),
            DataType::Boolean | DataType::String | DataType::DateTime => return None,
        };
        Some(variant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum StatusCode {
    Good,
    Bad,
    BadNodeIdUnknown,
    BadAttributeIdInvalid,
    BadNotReadable,
    BadNotWritable,
    BadTypeMismatch,
    BadArgumentsMissing,
    BadTooManyArguments,
    BadInvalidArgument,
    BadMethodInvalid,
    BadNotExecutable,
}

/// Read/write permission bits of a variable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessLevel(u8);

impl AccessLevel {
    pub const NONE: AccessLevel = AccessLevel(0);
    pub const CURRENT_READ: AccessLevel = AccessLevel(0x01);
    pub const CURRENT_WRITE: AccessLevel = AccessLevel(0x02);
    pub const CURRENT_READ_OR_WRITE: AccessLevel = AccessLevel(0x03);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn readable(self) -> bool {
        self.0 & Self::CURRENT_READ.0 != 0
    }

    pub fn writable(self) -> bool {
        self.0 & Self::CURRENT_WRITE.0 != 0
    }
}

/// Attributes a client may overwrite on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteMask(u32);

impl WriteMask {
    pub const NONE: WriteMask = WriteMask(0);
    pub const DESCRIPTION: WriteMask = WriteMask(1 << 5);
    pub const DISPLAY_NAME: WriteMask = WriteMask(1 << 6);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: WriteMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for WriteMask {
    type Output = WriteMask;

    fn bitor(self, rhs: WriteMask) -> WriteMask {
        WriteMask(self.0 | rhs.0)
    }
}

/// Result of a value read: payload, status and source timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataValue {
    pub value: Option<Variant>,
    pub status: StatusCode,
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    pub fn good(value: Variant, source_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            value: Some(value),
            status: StatusCode::Good,
            source_timestamp,
        }
    }

    pub fn bad(status: StatusCode) -> Self {
        Self {
            value: None,
            status,
            source_timestamp: None,
        }
    }
}
