//! Helper macro generating port error enums with snake_case constructors.
//!
//! Each variant becomes a `thiserror` variant plus a constructor accepting
//! `impl Into<T>` for every field, so adapters can write
//! `PersistenceError::query(err.to_string())`. The generated `kind()` names
//! the variant for structured log and error details.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*

            /// Snake-case variant name, stable across message changes.
            pub fn kind(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant { .. } => ::paste::paste! {
                            stringify!([<$variant:snake>])
                        },
                    )*
                }
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Constructor generation coverage.
    define_port_error! {
        pub enum SampleStoreError {
            Offline => "store offline",
            Rejected { reason: String } => "rejected: {reason}",
            Stale { expected: u64, actual: u64 } => "stale: expected {expected}, found {actual}",
        }
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(SampleStoreError::offline().to_string(), "store offline");
    }

    #[test]
    fn string_fields_accept_str() {
        let err = SampleStoreError::rejected("quota");
        assert_eq!(err, SampleStoreError::Rejected { reason: "quota".to_owned() });
    }

    #[test]
    fn numeric_fields_keep_their_type() {
        let err = SampleStoreError::stale(2_u64, 5_u64);
        assert_eq!(err.to_string(), "stale: expected 2, found 5");
    }

    #[test]
    fn kind_names_the_variant() {
        assert_eq!(SampleStoreError::offline().kind(), "offline");
        assert_eq!(SampleStoreError::stale(1_u64, 2_u64).kind(), "stale");
    }
}
