//! ---
//! devsim_section: "02-address-space"
//! devsim_subsection: "module"
//! devsim_type: "source"
//! devsim_scope: "code"
//! devsim_description: "Node model, node arena, and template node builder."
//! devsim_version: "v0.1.0"
//! devsim_owner: "tbd"
//! ---
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::prelude::*;

use crate::value::{DataType, ValueRank, Variant};

/// Longest array or matrix dimension the generator produces.
pub const MAX_ARRAY_LENGTH: usize = 10;

const WIDE_INTEGER_BOUND: i64 = 10_000;
const FLOAT_BOUND: f64 = 1_000.0;
const DATE_SPREAD_SECONDS: i64 = 365 * 24 * 60 * 60;
const MAX_NULL_FREQUENCY: f64 = 0.95;

/// Source of initial variable values.
///
/// A draw may yield nothing; callers that need a value keep drawing.
pub trait ValueSource: Send {
    fn draw(&mut self, data_type: DataType, value_rank: ValueRank) -> Option<Variant>;
}

/// Bounded random values for every built-in type and rank.
#[derive(Debug)]
pub struct RandomValueGenerator {
    rng: StdRng,
    null_frequency: f64,
}

impl RandomValueGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            null_frequency: 0.0,
        }
    }

    /// Probability of an empty draw, capped so retry loops terminate quickly.
    pub fn with_null_frequency(mut self, null_frequency: f64) -> Self {
        self.null_frequency = null_frequency.clamp(0.0, MAX_NULL_FREQUENCY);
        self
    }

    fn integer(&mut self, min: i64, max: i64) -> i64 {
        self.rng
            .gen_range(min.max(-WIDE_INTEGER_BOUND)..=max.min(WIDE_INTEGER_BOUND))
    }

    fn scalar(&mut self, data_type: DataType) -> Variant {
        match data_type {
            DataType::Boolean => Variant::Boolean(self.rng.gen()),
            DataType::SByte => Variant::SByte(self.rng.gen()),
            DataType::Byte => Variant::Byte(self.rng.gen()),
            DataType::Int16 => Variant::Int16(self.integer(i16::MIN.into(), i16::MAX.into()) as i16),
            DataType::UInt16 => Variant::UInt16(self.integer(0, u16::MAX.into()) as u16),
            DataType::Int32 => Variant::Int32(self.integer(i32::MIN.into(), i32::MAX.into()) as i32),
            DataType::UInt32 => Variant::UInt32(self.integer(0, u32::MAX.into()) as u32),
            DataType::Int64 => Variant::Int64(self.integer(i64::MIN, i64::MAX)),
            DataType::UInt64 => Variant::UInt64(self.integer(0, i64::MAX) as u64),
            DataType::Float => Variant::Float(self.rng.gen_range(-FLOAT_BOUND..=FLOAT_BOUND) as f32),
            DataType::Double => Variant::Double(self.rng.gen_range(-FLOAT_BOUND..=FLOAT_BOUND)),
            DataType::String => {
                let length = self.rng.gen_range(1..=MAX_ARRAY_LENGTH);
                let text = (&mut self.rng)
                    .sample_iter(&Alphanumeric)
                    .take(length)
                    .map(char::from)
                    .collect();
                Variant::String(text)
            }
            DataType::DateTime => {
                let shift = self
                    .rng
                    .gen_range(-DATE_SPREAD_SECONDS..=DATE_SPREAD_SECONDS);
                Variant::DateTime(Utc::now() + Duration::seconds(shift))
            }
        }
    }

    fn elements(&mut self, data_type: DataType, count: usize) -> Vec<Variant> {
        (0..count).map(|_| self.scalar(data_type)).collect()
    }
}

impl ValueSource for RandomValueGenerator {
    fn draw(&mut self, data_type: DataType, value_rank: ValueRank) -> Option<Variant> {
        if self.null_frequency > 0.0 && self.rng.gen_bool(self.null_frequency) {
            return None;
        }
        let value = match value_rank {
            ValueRank::Scalar => self.scalar(data_type),
            ValueRank::OneDimension => {
                let length = self.rng.gen_range(1..=MAX_ARRAY_LENGTH);
                Variant::Array(self.elements(data_type, length))
            }
            ValueRank::TwoDimensions => {
                let rows = self.rng.gen_range(1..=MAX_ARRAY_LENGTH);
                let columns = self.rng.gen_range(1..=MAX_ARRAY_LENGTH);
                Variant::Matrix {
                    dimensions: vec![rows as u32, columns as u32],
                    values: self.elements(data_type, rows * columns),
                }
            }
        };
        Some(value)
    }
}
