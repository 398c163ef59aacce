//! Typed change sets.
//!
//! Every update-style event carries a change set: one `Option` per mutable
//! field of a record. `Some(value)` means the field changed to `value`; an
//! absent field is unchanged. Because many record fields are themselves
//! optional, a change of `Some(None)` clears a field and must survive a JSON
//! round trip as an explicit `null`, which [`present`] takes care of.

use serde::{Deserialize, Deserializer};

/// Deserialize a present field as `Some`, even when its value is `null`.
///
/// Paired with `#[serde(default)]`, an absent key stays `None`.
pub(crate) fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A change set over one record type.
///
/// Implemented by every struct [`field_changes!`] generates, so generic
/// command flows (update, rollback) can diff and apply any record kind.
pub trait FieldChanges: Default + Clone + PartialEq + Send + Sync + 'static {
    type Record;

    /// Changes that turn `current` into `desired`.
    fn between(current: &Self::Record, desired: &Self::Record) -> Self;

    /// Write the present fields into a record.
    fn apply_to(&self, record: &mut Self::Record);

    fn is_empty(&self) -> bool;

    /// Names of the fields present in this change set.
    fn field_names(&self) -> Vec<&'static str>;
}

/// Define a change set for a record type.
///
/// Generates the struct plus:
///
/// * `FIELDS`: names of the tracked fields,
/// * `between(current, desired)`: fields that differ, with desired values,
/// * `apply_to(record)`: write the present fields into a record,
/// * `is_empty()` and `field_names()`,
/// * an impl of [`FieldChanges`] forwarding to the above.
macro_rules! field_changes {
    (
        $(#[$meta:meta])*
        pub struct $name:ident for $record:ty {
            $( $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
        pub struct $name {
            $(
                #[serde(
                    default,
                    skip_serializing_if = "Option::is_none",
                    deserialize_with = "crate::changes::present"
                )]
                pub $field: Option<$ty>,
            )*
        }

        impl $name {
            /// Names of every field this change set tracks.
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            /// Changes that turn `current` into `desired`.
            pub fn between(current: &$record, desired: &$record) -> Self {
                let mut changes = Self::default();
                $(
                    if current.$field != desired.$field {
                        changes.$field = Some(desired.$field.clone());
                    }
                )*
                changes
            }

            pub fn apply_to(&self, record: &mut $record) {
                $(
                    if let Some(value) = &self.$field {
                        record.$field = value.clone();
                    }
                )*
            }

            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())*
            }

            /// Names of the fields present in this change set.
            pub fn field_names(&self) -> Vec<&'static str> {
                let mut names = Vec::new();
                $(
                    if self.$field.is_some() {
                        names.push(stringify!($field));
                    }
                )*
                names
            }
        }

        impl $crate::changes::FieldChanges for $name {
            type Record = $record;

            fn between(current: &$record, desired: &$record) -> Self {
                $name::between(current, desired)
            }

            fn apply_to(&self, record: &mut $record) {
                $name::apply_to(self, record)
            }

            fn is_empty(&self) -> bool {
                $name::is_empty(self)
            }

            fn field_names(&self) -> Vec<&'static str> {
                $name::field_names(self)
            }
        }
    };
}
