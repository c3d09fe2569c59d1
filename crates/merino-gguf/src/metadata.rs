//! GGUF metadata value tree
//!
//! All thirteen GGUF value types are parsed; [`GgufValue::to_json`]
//! carries the tree into the native container's metadata blob during
//! import.

use byteorder::{LittleEndian, ReadBytesExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Read;

use crate::error::{GgufError, Result};

/// Metadata value type tags as defined by GGUF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GgufValueType {
    /// 8-bit unsigned integer
    UInt8 = 0,
    /// 8-bit signed integer
    Int8 = 1,
    /// 16-bit unsigned integer
    UInt16 = 2,
    /// 16-bit signed integer
    Int16 = 3,
    /// 32-bit unsigned integer
    UInt32 = 4,
    /// 32-bit signed integer
    Int32 = 5,
    /// 32-bit float
    Float32 = 6,
    /// Boolean
    Bool = 7,
    /// Length-prefixed UTF-8 string
    String = 8,
    /// Homogeneous array
    Array = 9,
    /// 64-bit unsigned integer
    UInt64 = 10,
    /// 64-bit signed integer
    Int64 = 11,
    /// 64-bit float
    Float64 = 12,
}

impl GgufValueType {
    /// Map a raw type tag.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::UInt8),
            1 => Some(Self::Int8),
            2 => Some(Self::UInt16),
            3 => Some(Self::Int16),
            4 => Some(Self::UInt32),
            5 => Some(Self::Int32),
            6 => Some(Self::Float32),
            7 => Some(Self::Bool),
            8 => Some(Self::String),
            9 => Some(Self::Array),
            10 => Some(Self::UInt64),
            11 => Some(Self::Int64),
            12 => Some(Self::Float64),
            _ => None,
        }
    }
}

/// One metadata value
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum GgufValue {
    UInt8(u8),
    Int8(i8),
    UInt16(u16),
    Int16(i16),
    UInt32(u32),
    Int32(i32),
    Float32(f32),
    Bool(bool),
    String(String),
    Array(Vec<GgufValue>),
    UInt64(u64),
    Int64(i64),
    Float64(f64),
}

impl GgufValue {
    /// Read one value of the given type.
    pub fn read_from<R: Read>(reader: &mut R, value_type: GgufValueType) -> Result<Self> {
        match value_type {
            GgufValueType::UInt8 => Ok(Self::UInt8(reader.read_u8()?)),
            GgufValueType::Int8 => Ok(Self::Int8(reader.read_i8()?)),
            GgufValueType::UInt16 => Ok(Self::UInt16(reader.read_u16::<LittleEndian>()?)),
            GgufValueType::Int16 => Ok(Self::Int16(reader.read_i16::<LittleEndian>()?)),
            GgufValueType::UInt32 => Ok(Self::UInt32(reader.read_u32::<LittleEndian>()?)),
            GgufValueType::Int32 => Ok(Self::Int32(reader.read_i32::<LittleEndian>()?)),
            GgufValueType::Float32 => Ok(Self::Float32(reader.read_f32::<LittleEndian>()?)),
            GgufValueType::Bool => Ok(Self::Bool(reader.read_u8()? != 0)),
            GgufValueType::String => Ok(Self::String(read_string(reader)?)),
            GgufValueType::Array => {
                let element_type = reader.read_u32::<LittleEndian>()?;
                let element_type = GgufValueType::from_u32(element_type).ok_or_else(|| {
                    GgufError::InvalidMetadata(format!("invalid array element type {element_type}"))
                })?;
                let len = reader.read_u64::<LittleEndian>()? as usize;
                let mut values = Vec::with_capacity(len.min(1 << 20));
                for _ in 0..len {
                    values.push(Self::read_from(reader, element_type)?);
                }
                Ok(Self::Array(values))
            }
            GgufValueType::UInt64 => Ok(Self::UInt64(reader.read_u64::<LittleEndian>()?)),
            GgufValueType::Int64 => Ok(Self::Int64(reader.read_i64::<LittleEndian>()?)),
            GgufValueType::Float64 => Ok(Self::Float64(reader.read_f64::<LittleEndian>()?)),
        }
    }

    /// Convert to a JSON value for the native metadata blob.
    pub fn to_json(&self) -> Value {
        match self {
            Self::UInt8(v) => json!(v),
            Self::Int8(v) => json!(v),
            Self::UInt16(v) => json!(v),
            Self::Int16(v) => json!(v),
            Self::UInt32(v) => json!(v),
            Self::Int32(v) => json!(v),
            Self::Float32(v) => json!(v),
            Self::Bool(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Array(values) => Value::Array(values.iter().map(Self::to_json).collect()),
            Self::UInt64(v) => json!(v),
            Self::Int64(v) => json!(v),
            Self::Float64(v) => json!(v),
        }
    }
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u64::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| GgufError::InvalidString)
}

/// Parsed metadata key-value pairs
#[derive(Debug, Clone, Default)]
pub struct GgufMetadata {
    /// All pairs in file order is not preserved; lookup is by key
    pub kv_pairs: HashMap<String, GgufValue>,
}

impl GgufMetadata {
    /// Read `count` key-value pairs.
    pub fn read_from<R: Read>(reader: &mut R, count: u64) -> Result<Self> {
        let mut metadata = Self::default();
        for _ in 0..count {
            let key = read_string(reader)?;
            let value_type = reader.read_u32::<LittleEndian>()?;
            let value_type = GgufValueType::from_u32(value_type).ok_or_else(|| {
                GgufError::InvalidMetadata(format!("invalid value type {value_type} for key '{key}'"))
            })?;
            let value = GgufValue::read_from(reader, value_type)?;
            metadata.kv_pairs.insert(key, value);
        }
        Ok(metadata)
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&GgufValue> {
        self.kv_pairs.get(key)
    }

    /// Get a string value by key
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            GgufValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get a u32 value by key
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.get(key)? {
            GgufValue::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    /// Get a u64 value by key
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            GgufValue::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert the whole tree to a JSON object.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::with_capacity(self.kv_pairs.len());
        for (key, value) in &self.kv_pairs {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

/// Well-known metadata keys
pub mod keys {
    /// Model architecture, e.g. "llama"
    pub const GENERAL_ARCHITECTURE: &str = "general.architecture";
    /// Model display name
    pub const GENERAL_NAME: &str = "general.name";
    /// Tensor data alignment
    pub const GENERAL_ALIGNMENT: &str = "general.alignment";
    /// Quantization format version
    pub const GENERAL_QUANTIZATION_VERSION: &str = "general.quantization_version";
}
