//! Per-operation input payloads.
//!
//! Each operation takes an explicit struct enumerating exactly the fields the
//! calling role may touch. The lifecycle manager applies them field by field;
//! there is no blanket merge that could clobber the other role's data.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

/// An uploaded file as received from the intake/review form.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Fields for the administrative create path. Any authenticated actor may
/// create a draft; only the demographic block is captured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftInput {
    pub uhid: String,
    pub lab_ref_no: String,
    pub date: Option<NaiveDate>,
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub cr_no: String,
    pub opd_ipd: String,
    pub ipd_no: String,
    pub consultant: String,
}

/// The full nurse intake form: demographics plus the clinical/gynae
/// narrative, specimen metadata, signature and attachments.
#[derive(Debug, Clone, Default)]
pub struct NurseIntake {
    pub uhid: String,
    pub lab_ref_no: String,
    pub date: Option<NaiveDate>,
    pub name: String,
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
    pub collected_at: Option<NaiveDateTime>,
    pub signature_image: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

/// The doctor-owned findings block. The review transition overwrites exactly
/// these fields and appends (never replaces) the attachment list.
#[derive(Debug, Clone, Default)]
pub struct DoctorReview {
    pub gross_description: String,
    pub microscopic_examination: String,
    pub impression: String,
    pub pathologist: String,
    pub special_stains: String,
    pub advice: String,
    pub signature_image: Option<String>,
    pub attachments: Vec<AttachmentUpload>,
}

/// Generic edit path usable by either role outside the two-step workflow.
/// Replaces every mutable field; status and creator/reviewer references are
/// never touched.
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    pub lab_ref_no: String,
    pub date: Option<NaiveDate>,
    pub name: String,
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
    pub collected_at: Option<NaiveDateTime>,
    pub received_at: Option<NaiveDateTime>,
    pub specimens_received: i32,
    pub specimen_no: String,
    pub micro_section_no: String,
    pub gross_description: String,
    pub microscopic_examination: String,
    pub impression: Option<String>,
    pub pathologist: Option<String>,
    pub pathologist_date: Option<NaiveDateTime>,
    pub special_stains: String,
    pub advice: String,
    pub attachments: Vec<AttachmentUpload>,
}
