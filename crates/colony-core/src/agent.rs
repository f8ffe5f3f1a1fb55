//! Agent identity and attribute access.
//!
//! Agents are plain structs. The [`Agent`] trait gives the container by-name
//! access to their scalar attributes, which is what bulk loads, exports and
//! index maintenance need. Implement it with [`agent_attributes!`](crate::agent_attributes).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use colony_table::Value;

/// Unique identifier for an agent within its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl AgentId {
    /// Largest id a container accepts. Ids travel through tables as signed
    /// integers, so they stay within `i64`.
    pub const MAX: AgentId = AgentId(i64::MAX as u64);
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AgentId> for Value {
    /// Ids above [`AgentId::MAX`] have no table form and become `Null`.
    fn from(id: AgentId) -> Self {
        i64::try_from(id.0).map_or(Value::Null, Value::Int)
    }
}

/// Errors raised by a by-name attribute write.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AttrError {
    #[error("agent has no attribute '{0}'")]
    Unknown(String),
    #[error("attribute '{attr}' expects {expected}, got {actual}")]
    TypeMismatch {
        attr: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// By-name access to an agent's scalar attributes.
pub trait Agent {
    /// Every attribute name the agent type declares
    const ATTRIBUTES: &'static [&'static str];

    /// Current value of `name`, or `None` if the attribute is not declared.
    fn attr(&self, name: &str) -> Option<Value>;

    /// Overwrite `name` with `value`.
    fn set_attr(&mut self, name: &str, value: Value) -> Result<(), AttrError>;

    fn declares(name: &str) -> bool {
        Self::ATTRIBUTES.contains(&name)
    }
}

/// Implement [`Agent`] for a struct by listing its scalar fields.
///
/// Each listed field must implement `Clone`, `Into<Value>` and
/// [`FromValue`](colony_table::FromValue).
///
/// ```ignore
/// #[derive(Debug, Clone, Default)]
/// struct Trader {
///     account: i64,
///     productivity: f64,
/// }
///
/// colony_core::agent_attributes!(Trader { account, productivity });
/// ```
#[macro_export]
macro_rules! agent_attributes {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Agent for $ty {
            const ATTRIBUTES: &'static [&'static str] = &[$(stringify!($field)),*];

            fn attr(&self, name: &str) -> Option<$crate::Value> {
                match name {
                    $(stringify!($field) => Some($crate::Value::from(self.$field.clone())),)*
                    _ => None,
                }
            }

            fn set_attr(
                &mut self,
                name: &str,
                value: $crate::Value,
            ) -> Result<(), $crate::AttrError> {
                match name {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::FromValue::from_value(&value).ok_or_else(|| {
                                $crate::AttrError::TypeMismatch {
                                    attr: name.to_string(),
                                    expected: $crate::__field_expected(&self.$field),
                                    actual: value.type_name(),
                                }
                            })?;
                            Ok(())
                        }
                    )*
                    _ => Err($crate::AttrError::Unknown(name.to_string())),
                }
            }
        }
    };
}

#[doc(hidden)]
pub fn __field_expected<T: colony_table::FromValue>(_field: &T) -> &'static str {
    T::EXPECTED
}
