use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

// Forward-only: a form never moves back to an earlier status.
str_enum!(FormStatus {
    Draft => "draft",
    NurseSubmitted => "nurse_submitted",
    DoctorReviewed => "doctor_reviewed",
});

str_enum!(Role {
    Doctor => "doctor",
    Nurse => "nurse",
});

str_enum!(HistoryAction {
    Created => "created",
    Updated => "updated",
    Reviewed => "reviewed",
});
