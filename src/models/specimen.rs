use serde::{Deserialize, Serialize};

/// An entry in the specimen-type master list shown on the intake form.
///
/// The list is reference data only: a requisition stores the chosen name as
/// text, so deleting a type never invalidates existing records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecimenType {
    pub id: i64,
    pub name: String,
}
