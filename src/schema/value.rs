use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::SchemaError;

/// Kind of value a schema leaf holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    StringArray,
    NumberArray,
    BooleanArray,
}

impl ValueKind {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            ValueKind::StringArray | ValueKind::NumberArray | ValueKind::BooleanArray
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Boolean => "boolean",
            ValueKind::StringArray => "string[]",
            ValueKind::NumberArray => "number[]",
            ValueKind::BooleanArray => "boolean[]",
        };
        f.write_str(name)
    }
}

/// A configuration leaf value.
///
/// The absent marker is modelled as `Option::<ConfigValue>::None` wherever a
/// value may be missing or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    String(String),
    Number(f64),
    Boolean(bool),
    StringArray(Vec<String>),
    NumberArray(Vec<f64>),
    BooleanArray(Vec<bool>),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::String(_) => ValueKind::String,
            ConfigValue::Number(_) => ValueKind::Number,
            ConfigValue::Boolean(_) => ValueKind::Boolean,
            ConfigValue::StringArray(_) => ValueKind::StringArray,
            ConfigValue::NumberArray(_) => ValueKind::NumberArray,
            ConfigValue::BooleanArray(_) => ValueKind::BooleanArray,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ConfigValue::String(s) => write!(f, "{s:?}"),
            ConfigValue::Number(n) => write!(f, "{n}"),
            ConfigValue::Boolean(b) => write!(f, "{b}"),
            ConfigValue::StringArray(v) => write!(f, "{v:?}"),
            ConfigValue::NumberArray(v) => write!(f, "{v:?}"),
            ConfigValue::BooleanArray(v) => write!(f, "{v:?}"),
        }
    }
}

macro_rules! impl_config_value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(value: $ty) -> Self {
                    ConfigValue::$variant(value)
                }
            }

            impl TryFrom<ConfigValue> for $ty {
                type Error = SchemaError;

                fn try_from(value: ConfigValue) -> Result<Self, Self::Error> {
                    match value {
                        ConfigValue::$variant(inner) => Ok(inner),
                        other => Err(SchemaError::TypeMismatch {
                            path: String::new(),
                            expected: ValueKind::$variant,
                            actual: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_config_value_conversions! {
    String => String,
    f64 => Number,
    bool => Boolean,
    Vec<String> => StringArray,
    Vec<f64> => NumberArray,
    Vec<bool> => BooleanArray,
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

/// Numbers are stored as `f64`; magnitudes above 2^53 lose precision.
impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Number(value as f64)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        ConfigValue::Number(f64::from(value))
    }
}

impl From<Vec<&str>> for ConfigValue {
    fn from(value: Vec<&str>) -> Self {
        ConfigValue::StringArray(value.into_iter().map(str::to_string).collect())
    }
}
