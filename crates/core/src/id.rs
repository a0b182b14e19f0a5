//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are positive integers assigned by the store. A value of zero,
//! a negative number, or anything non-numeric is never a valid identifier.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};

/// Common interface of the serial (store-assigned) identifiers.
pub trait SerialId: Copy + Sized {
    /// Build an identifier from a raw value, rejecting anything `<= 0`.
    fn from_positive(raw: i64) -> Option<Self>;

    /// Raw integer value.
    fn get(&self) -> i64;
}

/// Identifier of a country.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryId(i64);

/// Identifier of a region.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(i64);

/// Identifier of a department.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepartmentId(i64);

/// Identifier of a role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(i64);

/// Identifier of a permission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

/// Identifier of a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

macro_rules! impl_serial_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a value read back from storage.
            ///
            /// Storage adapters only hand out ids they assigned themselves, so no
            /// validation happens here. Use [`SerialId::from_positive`] or
            /// `FromStr` for anything that comes from a caller.
            pub const fn from_db(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl SerialId for $t {
            fn from_positive(raw: i64) -> Option<Self> {
                (raw > 0).then_some(Self(raw))
            }

            fn get(&self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(<$t as SerialId>::from_positive)
                    .ok_or_else(|| {
                        DomainError::validation(format!("{}: '{}' is not a positive integer", $name, s))
                    })
            }
        }
    };
}

impl_serial_id!(CountryId, "CountryId");
impl_serial_id!(RegionId, "RegionId");
impl_serial_id!(DepartmentId, "DepartmentId");
impl_serial_id!(RoleId, "RoleId");
impl_serial_id!(PermissionId, "PermissionId");
impl_serial_id!(UserId, "UserId");

/// Interpret a loosely-typed input value as an optional identifier.
///
/// JSON numbers and numeric strings are accepted. Zero, negatives, `null`,
/// absent and non-numeric values all mean "not provided".
pub fn optional_id<T: SerialId>(value: Option<&JsonValue>) -> Option<T> {
    let raw = match value? {
        JsonValue::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        })?,
        JsonValue::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    T::from_positive(raw)
}

/// Interpret a loosely-typed input value as a required identifier.
///
/// Anything [`optional_id`] treats as "not provided" is a validation failure.
pub fn required_id<T: SerialId>(field: &str, value: Option<&JsonValue>) -> DomainResult<T> {
    optional_id(value).ok_or_else(|| DomainError::validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numbers_and_numeric_strings() {
        assert_eq!(optional_id::<RegionId>(Some(&json!(7))), Some(RegionId::from_db(7)));
        assert_eq!(optional_id::<RegionId>(Some(&json!("12"))), Some(RegionId::from_db(12)));
        assert_eq!(optional_id::<RegionId>(Some(&json!(3.0))), Some(RegionId::from_db(3)));
    }

    #[test]
    fn zero_absent_and_garbage_are_not_provided() {
        assert_eq!(optional_id::<CountryId>(None), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!(null))), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!(0))), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!(-4))), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!("abc"))), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!(2.5))), None);
        assert_eq!(optional_id::<CountryId>(Some(&json!(true))), None);
    }

    #[test]
    fn required_id_reports_validation_error() {
        let err = required_id::<RoleId>("roleId", Some(&json!(0))).unwrap_err();
        assert_eq!(err, DomainError::validation("roleId is required"));
        assert_eq!(required_id::<RoleId>("roleId", Some(&json!(5))).unwrap().get(), 5);
    }

    #[test]
    fn from_str_rejects_non_positive() {
        assert!("0".parse::<UserId>().is_err());
        assert!("x".parse::<UserId>().is_err());
        assert_eq!(" 9 ".parse::<UserId>().unwrap(), UserId::from_db(9));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: numbers and numeric strings agree, and only positive
            /// values become identifiers.
            #[test]
            fn number_and_string_forms_agree(raw in any::<i64>()) {
                let from_number = optional_id::<DepartmentId>(Some(&json!(raw)));
                let from_string = optional_id::<DepartmentId>(Some(&json!(raw.to_string())));

                prop_assert_eq!(from_number, from_string);
                prop_assert_eq!(from_number.is_some(), raw > 0);
                prop_assert_eq!(raw.to_string().parse::<DepartmentId>().ok(), from_number);
            }
        }
    }
}
