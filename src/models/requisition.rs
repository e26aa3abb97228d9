use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::FormStatus;

/// A pathology requisition form, keyed by the clinic-assigned UHID.
///
/// Nurse-owned intake fields are written at creation/submission; the
/// doctor-owned findings block is overwritten exactly once by the review
/// transition. `uploaded_file_paths` is the `;`-joined list of relative
/// attachment paths managed by [`crate::storage::AttachmentStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequisitionRecord {
    pub uhid: String,
    pub lab_ref_no: String,
    pub date: NaiveDate,
    pub name: String,
    /// Stored as written on the paper form; not range-checked.
    pub age: i32,
    pub gender: String,
    pub cr_no: String,
    pub opd_ipd: String,
    pub ipd_no: String,
    pub consultant: String,
    pub clinical_diagnosis: String,
    pub menses_onset: Option<i32>,
    pub menses_cycle: Option<i32>,
    pub lasting_days: Option<i32>,
    pub character: String,
    pub lmp: String,
    pub gravida: String,
    pub para: String,
    pub menopause_age: Option<i32>,
    pub menopause_years: Option<i32>,
    pub hormone_therapy: String,
    pub xray_usg_ct_mri_findings: String,
    pub laboratory_findings: String,
    pub operative_findings: String,
    pub post_operative_diagnosis: String,
    pub previous_hp_cyt_report: String,
    pub specimen_name: Option<String>,
    pub collected_at: NaiveDateTime,
    pub received_at: NaiveDateTime,
    pub processed_at: NaiveDateTime,
    pub specimens_received: i32,
    pub specimen_no: String,
    pub micro_section_no: String,
    pub special_stains: String,
    pub gross_description: String,
    pub microscopic_examination: String,
    pub impression: Option<String>,
    pub pathologist: Option<String>,
    pub pathologist_date: NaiveDateTime,
    pub advice: String,
    pub uploaded_file_paths: String,
    pub signature_image: Option<String>,
    pub status: FormStatus,
    /// Set exactly once at creation, never changed afterwards.
    pub created_by: String,
    /// Set together with `reviewed_at` by the doctor-review transition.
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
