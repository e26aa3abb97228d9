//! Form review lifecycle.
//!
//! Owns the state machine a requisition moves through (Draft →
//! NurseSubmitted → DoctorReviewed), which fields each role may mutate at
//! each step, and the audit trail appended for every accepted mutation.
//!
//! Every mutating operation runs its record write and its history append in
//! one SQLite transaction: a failed append rolls the whole operation back, so
//! no mutation is ever visible without its audit entry. Attachment files are
//! written to disk *before* the transaction — a crash in between leaves an
//! orphaned file rather than a dangling path, the lesser failure.
//!
//! There is no record-level locking and no version token: two concurrent
//! edits of the same UHID race and the last commit wins, keeping both history
//! entries. Callers pass the acting user explicitly; nothing here reads
//! ambient session state.

use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;

use crate::db::{repository, DatabaseError};
use crate::models::enums::{FormStatus, HistoryAction, Role};
use crate::models::filters::RequisitionFilter;
use crate::models::history::HistoryEvent;
use crate::models::inputs::{AttachmentUpload, DoctorReview, DraftInput, NurseIntake, RecordUpdate};
use crate::models::requisition::RequisitionRecord;
use crate::models::specimen::SpecimenType;
use crate::models::user::Actor;
use crate::storage::{join_paths, split_paths, AttachmentStore};

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Missing required field: {field}")]
    Validation { field: &'static str },

    #[error("A requisition with UHID {uhid} already exists")]
    DuplicateKey { uhid: String },

    #[error("No requisition found with UHID {uhid}")]
    NotFound { uhid: String },

    #[error("Operation requires the {required:?} role, actor has the {actual:?} role")]
    Authorization { required: Role, actual: Role },

    #[error("Database error: {0}")]
    Store(#[from] DatabaseError),

    #[error("Attachment storage error: {0}")]
    Attachment(#[from] std::io::Error),
}

/// Outcome of an attachment removal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentRemoval {
    Removed,
    /// The path was not in the record's attachment list; nothing changed.
    NotFound,
}

pub struct LifecycleManager {
    store: AttachmentStore,
}

impl LifecycleManager {
    pub fn new(store: AttachmentStore) -> Self {
        Self { store }
    }

    /// Create a form in Draft status — the administrative path open to any
    /// authenticated actor. Only the demographic block is captured.
    pub fn create_draft(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        input: DraftInput,
    ) -> Result<String, LifecycleError> {
        let date = validate_required(
            &input.uhid,
            &input.lab_ref_no,
            input.date,
            &input.name,
            &input.gender,
            &input.consultant,
        )?;

        let now = Utc::now().naive_utc();
        let mut record = base_record(&input.uhid, &actor.id, now);
        record.lab_ref_no = input.lab_ref_no;
        record.date = date;
        record.name = input.name;
        record.age = input.age; // stored as supplied; the paper form does not bound it
        record.gender = input.gender;
        record.cr_no = input.cr_no;
        record.opd_ipd = input.opd_ipd;
        record.ipd_no = input.ipd_no;
        record.consultant = input.consultant;
        record.status = FormStatus::Draft;

        let tx = conn.transaction().map_err(DatabaseError::from)?;
        insert_mapping_duplicates(&tx, &record)?;
        repository::append_history(
            &tx,
            &record.uhid,
            &actor.id,
            &HistoryAction::Created,
            Some("Form created"),
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(uhid = %record.uhid, user = %actor.id, "Requisition draft created");
        Ok(record.uhid)
    }

    /// Nurse intake: the full demographic + clinical/gynae form, with any
    /// uploaded attachments. Forces the record into NurseSubmitted.
    pub fn submit_as_nurse(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        input: NurseIntake,
    ) -> Result<String, LifecycleError> {
        if actor.role != Role::Nurse {
            return Err(LifecycleError::Authorization {
                required: Role::Nurse,
                actual: actor.role.clone(),
            });
        }
        let date = validate_required(
            &input.uhid,
            &input.lab_ref_no,
            input.date,
            &input.name,
            &input.gender,
            &input.consultant,
        )?;

        // Files first: a crash after this point orphans them on disk but
        // never leaves the record pointing at paths that were never written.
        let attachment_paths = self.save_all(&input.attachments)?;

        let now = Utc::now().naive_utc();
        let mut record = base_record(&input.uhid, &actor.id, now);
        record.lab_ref_no = input.lab_ref_no;
        record.date = date;
        record.name = input.name;
        record.age = input.age;
        record.gender = input.gender;
        record.cr_no = input.cr_no;
        record.opd_ipd = input.opd_ipd;
        record.ipd_no = input.ipd_no;
        record.consultant = input.consultant;
        record.clinical_diagnosis = input.clinical_diagnosis;
        record.menses_onset = input.menses_onset;
        record.menses_cycle = input.menses_cycle;
        record.lasting_days = input.lasting_days;
        record.character = input.character;
        record.lmp = input.lmp;
        record.gravida = input.gravida;
        record.para = input.para;
        record.menopause_age = input.menopause_age;
        record.menopause_years = input.menopause_years;
        record.hormone_therapy = input.hormone_therapy;
        record.xray_usg_ct_mri_findings = input.xray_usg_ct_mri_findings;
        record.laboratory_findings = input.laboratory_findings;
        record.operative_findings = input.operative_findings;
        record.post_operative_diagnosis = input.post_operative_diagnosis;
        record.previous_hp_cyt_report = input.previous_hp_cyt_report;
        record.specimen_name = input.specimen_name;
        record.collected_at = input.collected_at.unwrap_or(now);
        record.signature_image = input.signature_image;
        record.uploaded_file_paths = join_paths(&attachment_paths);
        record.status = FormStatus::NurseSubmitted;

        let tx = conn.transaction().map_err(DatabaseError::from)?;
        insert_mapping_duplicates(&tx, &record)?;
        repository::append_history(
            &tx,
            &record.uhid,
            &actor.id,
            &HistoryAction::Created,
            Some("Form created by nurse"),
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            uhid = %record.uhid,
            user = %actor.id,
            attachments = attachment_paths.len(),
            "Requisition submitted by nurse"
        );
        Ok(record.uhid)
    }

    /// Doctor review: overwrites the doctor-owned findings block, appends
    /// new attachments to the existing list, and advances the record to
    /// DoctorReviewed with reviewer identity and timestamp.
    pub fn review_as_doctor(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        uhid: &str,
        input: DoctorReview,
    ) -> Result<(), LifecycleError> {
        if !repository::requisition_exists(conn, uhid)? {
            return Err(LifecycleError::NotFound { uhid: uhid.into() });
        }
        if actor.role != Role::Doctor {
            return Err(LifecycleError::Authorization {
                required: Role::Doctor,
                actual: actor.role.clone(),
            });
        }
        if input.impression.trim().is_empty() {
            return Err(LifecycleError::Validation { field: "impression" });
        }
        if input.pathologist.trim().is_empty() {
            return Err(LifecycleError::Validation { field: "pathologist" });
        }

        let new_paths = self.save_all(&input.attachments)?;
        let now = Utc::now().naive_utc();

        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let mut record = repository::get_requisition(&tx, uhid)?
            .ok_or_else(|| LifecycleError::NotFound { uhid: uhid.into() })?;

        // Doctor-owned subset only; nurse intake fields are untouched.
        record.gross_description = input.gross_description;
        record.microscopic_examination = input.microscopic_examination;
        record.impression = Some(input.impression);
        record.pathologist = Some(input.pathologist);
        record.special_stains = input.special_stains;
        record.advice = input.advice;
        record.signature_image = input.signature_image;
        record.pathologist_date = now;

        let mut paths = split_paths(&record.uploaded_file_paths);
        paths.extend(new_paths);
        record.uploaded_file_paths = join_paths(&paths);

        record.status = FormStatus::DoctorReviewed;
        record.reviewed_by = Some(actor.id.clone());
        record.reviewed_at = Some(now);
        record.updated_at = now;

        repository::update_requisition(&tx, &record)?;
        repository::append_history(
            &tx,
            uhid,
            &actor.id,
            &HistoryAction::Reviewed,
            Some("Form reviewed and updated by doctor"),
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(uhid = %uhid, user = %actor.id, "Requisition reviewed by doctor");
        Ok(())
    }

    /// Generic edit path for either role. Replaces every mutable field;
    /// status, creator and reviewer references are never touched.
    pub fn update_record(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        uhid: &str,
        input: RecordUpdate,
    ) -> Result<(), LifecycleError> {
        if !repository::requisition_exists(conn, uhid)? {
            return Err(LifecycleError::NotFound { uhid: uhid.into() });
        }
        let date = validate_required(
            uhid,
            &input.lab_ref_no,
            input.date,
            &input.name,
            &input.gender,
            &input.consultant,
        )?;

        let new_paths = self.save_all(&input.attachments)?;
        let now = Utc::now().naive_utc();

        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let mut record = repository::get_requisition(&tx, uhid)?
            .ok_or_else(|| LifecycleError::NotFound { uhid: uhid.into() })?;

        record.lab_ref_no = input.lab_ref_no;
        record.date = date;
        record.name = input.name;
        record.age = input.age;
        record.gender = input.gender;
        record.cr_no = input.cr_no;
        record.opd_ipd = input.opd_ipd;
        record.ipd_no = input.ipd_no;
        record.consultant = input.consultant;
        record.clinical_diagnosis = input.clinical_diagnosis;
        record.menses_onset = input.menses_onset;
        record.menses_cycle = input.menses_cycle;
        record.lasting_days = input.lasting_days;
        record.character = input.character;
        record.lmp = input.lmp;
        record.gravida = input.gravida;
        record.para = input.para;
        record.menopause_age = input.menopause_age;
        record.menopause_years = input.menopause_years;
        record.hormone_therapy = input.hormone_therapy;
        record.xray_usg_ct_mri_findings = input.xray_usg_ct_mri_findings;
        record.laboratory_findings = input.laboratory_findings;
        record.operative_findings = input.operative_findings;
        record.post_operative_diagnosis = input.post_operative_diagnosis;
        record.previous_hp_cyt_report = input.previous_hp_cyt_report;
        record.specimen_name = input.specimen_name;
        if let Some(collected_at) = input.collected_at {
            record.collected_at = collected_at;
        }
        if let Some(received_at) = input.received_at {
            record.received_at = received_at;
        }
        record.specimens_received = input.specimens_received;
        record.specimen_no = input.specimen_no;
        record.micro_section_no = input.micro_section_no;
        record.gross_description = input.gross_description;
        record.microscopic_examination = input.microscopic_examination;
        record.impression = input.impression;
        record.pathologist = input.pathologist;
        if let Some(pathologist_date) = input.pathologist_date {
            record.pathologist_date = pathologist_date;
        }
        record.special_stains = input.special_stains;
        record.advice = input.advice;

        let mut paths = split_paths(&record.uploaded_file_paths);
        paths.extend(new_paths);
        record.uploaded_file_paths = join_paths(&paths);
        record.updated_at = now;

        repository::update_requisition(&tx, &record)?;
        repository::append_history(
            &tx,
            uhid,
            &actor.id,
            &HistoryAction::Updated,
            Some("Form updated"),
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(uhid = %uhid, user = %actor.id, "Requisition updated");
        Ok(())
    }

    /// Remove one attachment entry (case-insensitive match) and its file.
    ///
    /// A path outside the upload root is refused before anything is touched.
    /// A path that is simply not on the record reports NotFound without
    /// mutating the record or the disk. The file itself is deleted only
    /// after the record mutation commits; a deletion failure leaves an
    /// orphaned file, not a dangling path.
    pub fn remove_attachment(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        uhid: &str,
        file_path: &str,
    ) -> Result<AttachmentRemoval, LifecycleError> {
        if !AttachmentStore::is_managed_path(file_path) {
            tracing::warn!(uhid = %uhid, path = %file_path, "Rejected attachment path outside upload root");
            return Err(LifecycleError::Validation { field: "file_path" });
        }

        let now = Utc::now().naive_utc();
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let mut record = repository::get_requisition(&tx, uhid)?
            .ok_or_else(|| LifecycleError::NotFound { uhid: uhid.into() })?;

        let mut paths = split_paths(&record.uploaded_file_paths);
        let before = paths.len();
        paths.retain(|p| !p.eq_ignore_ascii_case(file_path));
        if paths.len() == before {
            return Ok(AttachmentRemoval::NotFound);
        }

        record.uploaded_file_paths = join_paths(&paths);
        record.updated_at = now;
        repository::update_requisition(&tx, &record)?;
        repository::append_history(
            &tx,
            uhid,
            &actor.id,
            &HistoryAction::Updated,
            Some("Attachment removed"),
        )?;
        tx.commit().map_err(DatabaseError::from)?;

        match self.store.delete(file_path) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(uhid = %uhid, path = %file_path, "Attachment entry removed but file was not on disk")
            }
            Err(e) => {
                tracing::warn!(uhid = %uhid, path = %file_path, error = %e, "Attachment file left orphaned after removal")
            }
        }

        tracing::info!(uhid = %uhid, user = %actor.id, path = %file_path, "Attachment removed");
        Ok(AttachmentRemoval::Removed)
    }

    /// Delete the record and its history. Attachment files stay on disk —
    /// a known limitation, surfaced in the log rather than silently ignored.
    pub fn delete_record(
        &self,
        conn: &mut Connection,
        actor: &Actor,
        uhid: &str,
    ) -> Result<(), LifecycleError> {
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let record = repository::get_requisition(&tx, uhid)?
            .ok_or_else(|| LifecycleError::NotFound { uhid: uhid.into() })?;
        let orphaned = split_paths(&record.uploaded_file_paths).len();

        repository::delete_requisition_cascade(&tx, uhid)?;
        tx.commit().map_err(DatabaseError::from)?;

        if orphaned > 0 {
            tracing::warn!(uhid = %uhid, files = orphaned, "Requisition deleted; attachment files left on disk");
        }
        tracing::info!(uhid = %uhid, user = %actor.id, "Requisition deleted");
        Ok(())
    }

    pub fn get_record(
        &self,
        conn: &Connection,
        uhid: &str,
    ) -> Result<Option<RequisitionRecord>, LifecycleError> {
        Ok(repository::get_requisition(conn, uhid)?)
    }

    pub fn list_records(
        &self,
        conn: &Connection,
        filter: &RequisitionFilter,
    ) -> Result<Vec<RequisitionRecord>, LifecycleError> {
        Ok(repository::list_requisitions(conn, filter)?)
    }

    pub fn history_for_record(
        &self,
        conn: &Connection,
        uhid: &str,
    ) -> Result<Vec<HistoryEvent>, LifecycleError> {
        Ok(repository::history_for_record(conn, uhid)?)
    }

    /// The specimen-type master list offered on the intake form.
    pub fn list_specimen_types(
        &self,
        conn: &Connection,
    ) -> Result<Vec<SpecimenType>, LifecycleError> {
        Ok(repository::list_specimen_types(conn)?)
    }

    /// Add a specimen type to the master list.
    ///
    /// Adding a name that already exists (in any case) returns the existing
    /// entry rather than failing; the list is reference data, not a record.
    pub fn add_specimen_type(
        &self,
        conn: &Connection,
        name: &str,
    ) -> Result<SpecimenType, LifecycleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LifecycleError::Validation { field: "name" });
        }

        match repository::insert_specimen_type(conn, name) {
            Ok(id) => {
                tracing::info!(id, name = %name, "Specimen type added");
                Ok(SpecimenType {
                    id,
                    name: name.to_string(),
                })
            }
            Err(err @ DatabaseError::ConstraintViolation(_)) => {
                match repository::get_specimen_type_by_name(conn, name)? {
                    Some(existing) => Ok(existing),
                    None => Err(err.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a specimen type from the master list.
    ///
    /// Requisitions store the chosen name as text, so removal never touches
    /// existing records.
    pub fn remove_specimen_type(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<(), LifecycleError> {
        repository::delete_specimen_type(conn, id)?;
        tracing::info!(id, "Specimen type removed");
        Ok(())
    }

    fn save_all(&self, uploads: &[AttachmentUpload]) -> Result<Vec<String>, LifecycleError> {
        let mut paths = Vec::with_capacity(uploads.len());
        for upload in uploads {
            if upload.bytes.is_empty() {
                continue;
            }
            paths.push(self.store.save(upload)?);
        }
        Ok(paths)
    }
}

fn validate_required(
    uhid: &str,
    lab_ref_no: &str,
    date: Option<chrono::NaiveDate>,
    name: &str,
    gender: &str,
    consultant: &str,
) -> Result<chrono::NaiveDate, LifecycleError> {
    if uhid.trim().is_empty() {
        return Err(LifecycleError::Validation { field: "uhid" });
    }
    if lab_ref_no.trim().is_empty() {
        return Err(LifecycleError::Validation { field: "lab_ref_no" });
    }
    if name.trim().is_empty() {
        return Err(LifecycleError::Validation { field: "name" });
    }
    if gender.trim().is_empty() {
        return Err(LifecycleError::Validation { field: "gender" });
    }
    if consultant.trim().is_empty() {
        return Err(LifecycleError::Validation { field: "consultant" });
    }
    date.ok_or(LifecycleError::Validation { field: "date" })
}

/// Insert, translating a primary-key collision into DuplicateKey.
fn insert_mapping_duplicates(
    conn: &Connection,
    record: &RequisitionRecord,
) -> Result<(), LifecycleError> {
    repository::insert_requisition(conn, record).map_err(|e| match e {
        DatabaseError::Sqlite(ref s) if is_duplicate_uhid(s) => LifecycleError::DuplicateKey {
            uhid: record.uhid.clone(),
        },
        other => other.into(),
    })
}

fn is_duplicate_uhid(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn base_record(uhid: &str, created_by: &str, now: NaiveDateTime) -> RequisitionRecord {
    RequisitionRecord {
        uhid: uhid.into(),
        lab_ref_no: String::new(),
        date: now.date(),
        name: String::new(),
        age: 0,
        gender: String::new(),
        cr_no: String::new(),
        opd_ipd: String::new(),
        ipd_no: String::new(),
        consultant: String::new(),
        clinical_diagnosis: String::new(),
        menses_onset: None,
        menses_cycle: None,
        lasting_days: None,
        character: String::new(),
        lmp: String::new(),
        gravida: String::new(),
        para: String::new(),
        menopause_age: None,
        menopause_years: None,
        hormone_therapy: String::new(),
        xray_usg_ct_mri_findings: String::new(),
        laboratory_findings: String::new(),
        operative_findings: String::new(),
        post_operative_diagnosis: String::new(),
        previous_hp_cyt_report: String::new(),
        specimen_name: None,
        collected_at: now,
        received_at: now,
        processed_at: now,
        specimens_received: 0,
        specimen_no: String::new(),
        micro_section_no: String::new(),
        special_stains: String::new(),
        gross_description: String::new(),
        microscopic_examination: String::new(),
        impression: None,
        pathologist: None,
        pathologist_date: now,
        advice: String::new(),
        uploaded_file_paths: String::new(),
        signature_image: None,
        status: FormStatus::Draft,
        created_by: created_by.into(),
        reviewed_by: None,
        reviewed_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::db::sqlite::open_memory_database;
    use crate::models::user::User;
    use crate::storage::UPLOAD_PREFIX;

    fn setup() -> (tempfile::TempDir, LifecycleManager, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let manager = LifecycleManager::new(AttachmentStore::new(dir.path()));
        let conn = open_memory_database().unwrap();
        for (id, name, role) in [
            ("nurse-1", "Nurse Joy", Role::Nurse),
            ("doctor-1", "Dr. Y", Role::Doctor),
        ] {
            repository::insert_user(
                &conn,
                &User {
                    id: id.into(),
                    full_name: name.into(),
                    role,
                    is_active: true,
                    created_at: Utc::now().naive_utc(),
                },
            )
            .unwrap();
        }
        (dir, manager, conn)
    }

    fn nurse() -> Actor {
        Actor::new("nurse-1", Role::Nurse)
    }

    fn doctor() -> Actor {
        Actor::new("doctor-1", Role::Doctor)
    }

    fn draft_input(uhid: &str) -> DraftInput {
        DraftInput {
            uhid: uhid.into(),
            lab_ref_no: "L1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            name: "Jane Doe".into(),
            age: 34,
            gender: "F".into(),
            consultant: "Dr. X".into(),
            ..Default::default()
        }
    }

    fn nurse_intake(uhid: &str) -> NurseIntake {
        NurseIntake {
            uhid: uhid.into(),
            lab_ref_no: "L1".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1),
            name: "Jane Doe".into(),
            age: 34,
            gender: "F".into(),
            consultant: "Dr. X".into(),
            clinical_diagnosis: "Fibroid uterus".into(),
            lmp: "2023-12-20".into(),
            gravida: "G2".into(),
            ..Default::default()
        }
    }

    fn doctor_review() -> DoctorReview {
        DoctorReview {
            gross_description: "Single grey-white nodule 3cm".into(),
            microscopic_examination: "Interlacing smooth muscle bundles".into(),
            impression: "Benign leiomyoma".into(),
            pathologist: "Dr. Y".into(),
            ..Default::default()
        }
    }

    fn upload(name: &str) -> AttachmentUpload {
        AttachmentUpload {
            file_name: name.into(),
            bytes: b"scan bytes".to_vec(),
        }
    }

    #[test]
    fn nurse_submission_sets_status_and_single_history_event() {
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.status, FormStatus::NurseSubmitted);
        assert_eq!(record.created_by, "nurse-1");
        assert!(record.reviewed_by.is_none());
        assert!(record.reviewed_at.is_none());

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[0].comments.as_deref(), Some("Form created by nurse"));
    }

    #[test]
    fn submit_as_nurse_requires_nurse_role() {
        let (_dir, manager, mut conn) = setup();
        let result = manager.submit_as_nurse(&mut conn, &doctor(), nurse_intake("U100"));
        assert!(matches!(result, Err(LifecycleError::Authorization { .. })));
        assert!(manager.get_record(&conn, "U100").unwrap().is_none());
    }

    #[test]
    fn missing_required_field_is_validation_error() {
        let (_dir, manager, mut conn) = setup();
        let mut input = draft_input("U100");
        input.consultant = "  ".into();
        let result = manager.create_draft(&mut conn, &nurse(), input);
        assert!(matches!(
            result,
            Err(LifecycleError::Validation { field: "consultant" })
        ));
    }

    #[test]
    fn zero_or_negative_age_is_accepted() {
        let (_dir, manager, mut conn) = setup();
        let mut input = draft_input("U100");
        input.age = -3;
        manager.create_draft(&mut conn, &nurse(), input).unwrap();
        assert_eq!(manager.get_record(&conn, "U100").unwrap().unwrap().age, -3);
    }

    #[test]
    fn duplicate_uhid_rejected_and_single_record_remains() {
        let (_dir, manager, mut conn) = setup();
        manager.create_draft(&mut conn, &nurse(), draft_input("U100")).unwrap();

        let result = manager.create_draft(&mut conn, &nurse(), draft_input("U100"));
        assert!(matches!(result, Err(LifecycleError::DuplicateKey { .. })));

        let all = manager
            .list_records(&conn, &RequisitionFilter::default())
            .unwrap();
        assert_eq!(all.len(), 1);
        // The failed create must not leave a second history entry either.
        assert_eq!(manager.history_for_record(&conn, "U100").unwrap().len(), 1);
    }

    #[test]
    fn doctor_review_transitions_and_appends_one_event() {
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();
        manager
            .review_as_doctor(&mut conn, &doctor(), "U100", doctor_review())
            .unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.status, FormStatus::DoctorReviewed);
        assert_eq!(record.reviewed_by.as_deref(), Some("doctor-1"));
        assert!(record.reviewed_at.is_some());
        assert_eq!(record.impression.as_deref(), Some("Benign leiomyoma"));
        assert_eq!(record.pathologist.as_deref(), Some("Dr. Y"));

        // Nurse intake fields survive the review untouched.
        assert_eq!(record.clinical_diagnosis, "Fibroid uterus");
        assert_eq!(record.lmp, "2023-12-20");
        assert_eq!(record.created_by, "nurse-1");

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[1].action, HistoryAction::Reviewed);
    }

    #[test]
    fn review_nonexistent_uhid_is_not_found_with_no_history() {
        let (_dir, manager, mut conn) = setup();
        let result = manager.review_as_doctor(&mut conn, &doctor(), "GHOST", doctor_review());
        assert!(matches!(result, Err(LifecycleError::NotFound { .. })));
        assert_eq!(repository::history_count(&conn, "GHOST").unwrap(), 0);
    }

    #[test]
    fn review_requires_doctor_role() {
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        let result = manager.review_as_doctor(&mut conn, &nurse(), "U100", doctor_review());
        assert!(matches!(result, Err(LifecycleError::Authorization { .. })));

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.status, FormStatus::NurseSubmitted);
    }

    #[test]
    fn review_requires_impression_and_pathologist() {
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        let mut review = doctor_review();
        review.impression = String::new();
        let result = manager.review_as_doctor(&mut conn, &doctor(), "U100", review);
        assert!(matches!(
            result,
            Err(LifecycleError::Validation { field: "impression" })
        ));

        let mut review = doctor_review();
        review.pathologist = " ".into();
        let result = manager.review_as_doctor(&mut conn, &doctor(), "U100", review);
        assert!(matches!(
            result,
            Err(LifecycleError::Validation { field: "pathologist" })
        ));
    }

    #[test]
    fn concurrent_reviews_last_writer_wins_with_both_history_entries() {
        // No version token exists, so a second review silently overwrites
        // the first while both Reviewed events stay in the history. This
        // pins the accepted limitation rather than guaranteeing it forever.
        let (_dir, manager, mut conn) = setup();
        repository::insert_user(
            &conn,
            &User {
                id: "doctor-2".into(),
                full_name: "Dr. Z".into(),
                role: Role::Doctor,
                is_active: true,
                created_at: Utc::now().naive_utc(),
            },
        )
        .unwrap();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        manager
            .review_as_doctor(&mut conn, &doctor(), "U100", doctor_review())
            .unwrap();
        let mut second = doctor_review();
        second.impression = "Leiomyosarcoma, low grade".into();
        second.pathologist = "Dr. Z".into();
        manager
            .review_as_doctor(&mut conn, &Actor::new("doctor-2", Role::Doctor), "U100", second)
            .unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.impression.as_deref(), Some("Leiomyosarcoma, low grade"));
        assert_eq!(record.reviewed_by.as_deref(), Some("doctor-2"));

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].user_id, "doctor-1");
        assert_eq!(history[2].user_id, "doctor-2");
    }

    #[test]
    fn nurse_attachments_stored_and_referenced() {
        let (dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        let paths = split_paths(&record.uploaded_file_paths);
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with(UPLOAD_PREFIX));

        let on_disk = dir
            .path()
            .join("uploads")
            .join(paths[0].trim_start_matches(UPLOAD_PREFIX));
        assert!(on_disk.exists());
    }

    #[test]
    fn review_appends_attachments_instead_of_replacing() {
        let (_dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("intake.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let nurse_path = {
            let record = manager.get_record(&conn, "U100").unwrap().unwrap();
            split_paths(&record.uploaded_file_paths)[0].clone()
        };

        let mut review = doctor_review();
        review.attachments = vec![upload("slide.jpg")];
        manager.review_as_doctor(&mut conn, &doctor(), "U100", review).unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        let paths = split_paths(&record.uploaded_file_paths);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], nurse_path);
    }

    #[test]
    fn update_record_preserves_status_and_ownership() {
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        let mut update = RecordUpdate {
            lab_ref_no: "L2".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5),
            name: "Jane A. Doe".into(),
            age: 35,
            gender: "F".into(),
            consultant: "Dr. X".into(),
            ..Default::default()
        };
        update.clinical_diagnosis = "Fibroid uterus, revised".into();
        manager.update_record(&mut conn, &doctor(), "U100", update).unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.name, "Jane A. Doe");
        assert_eq!(record.lab_ref_no, "L2");
        assert_eq!(record.status, FormStatus::NurseSubmitted);
        assert_eq!(record.created_by, "nurse-1");
        assert!(record.reviewed_by.is_none());

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, HistoryAction::Updated);
        assert_eq!(history[1].comments.as_deref(), Some("Form updated"));
    }

    #[test]
    fn remove_attachment_deletes_entry_and_file() {
        let (dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let path = {
            let record = manager.get_record(&conn, "U100").unwrap().unwrap();
            split_paths(&record.uploaded_file_paths)[0].clone()
        };

        let outcome = manager
            .remove_attachment(&mut conn, &nurse(), "U100", &path)
            .unwrap();
        assert_eq!(outcome, AttachmentRemoval::Removed);

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert!(split_paths(&record.uploaded_file_paths).is_empty());

        let on_disk = dir
            .path()
            .join("uploads")
            .join(path.trim_start_matches(UPLOAD_PREFIX));
        assert!(!on_disk.exists());

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.last().unwrap().comments.as_deref(), Some("Attachment removed"));
    }

    #[test]
    fn remove_attachment_matches_case_insensitively() {
        let (_dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let path = {
            let record = manager.get_record(&conn, "U100").unwrap().unwrap();
            split_paths(&record.uploaded_file_paths)[0].clone()
        };

        let outcome = manager
            .remove_attachment(&mut conn, &nurse(), "U100", &path.to_uppercase())
            .unwrap();
        assert_eq!(outcome, AttachmentRemoval::Removed);
    }

    #[test]
    fn remove_attachment_not_on_record_reports_not_found() {
        let (_dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();
        let before = manager.get_record(&conn, "U100").unwrap().unwrap();

        let outcome = manager
            .remove_attachment(&mut conn, &nurse(), "U100", "/uploads/other.jpg")
            .unwrap();
        assert_eq!(outcome, AttachmentRemoval::NotFound);

        let after = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(after.uploaded_file_paths, before.uploaded_file_paths);
        assert_eq!(manager.history_for_record(&conn, "U100").unwrap().len(), 1);
    }

    #[test]
    fn remove_attachment_rejects_traversal_without_deleting() {
        let (dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let path = {
            let record = manager.get_record(&conn, "U100").unwrap().unwrap();
            split_paths(&record.uploaded_file_paths)[0].clone()
        };

        for bad in ["/etc/passwd", "/uploads/../secret.txt", "relative.jpg"] {
            let result = manager.remove_attachment(&mut conn, &nurse(), "U100", bad);
            assert!(matches!(result, Err(LifecycleError::Validation { .. })));
        }

        // The real attachment is untouched on record and on disk.
        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(split_paths(&record.uploaded_file_paths).len(), 1);
        let on_disk = dir
            .path()
            .join("uploads")
            .join(path.trim_start_matches(UPLOAD_PREFIX));
        assert!(on_disk.exists());
    }

    #[test]
    fn delete_record_cascades_history_and_leaves_files() {
        let (dir, manager, mut conn) = setup();
        let mut intake = nurse_intake("U100");
        intake.attachments = vec![upload("scan.jpg")];
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        let path = {
            let record = manager.get_record(&conn, "U100").unwrap().unwrap();
            split_paths(&record.uploaded_file_paths)[0].clone()
        };

        manager.delete_record(&mut conn, &nurse(), "U100").unwrap();
        assert!(manager.get_record(&conn, "U100").unwrap().is_none());
        assert_eq!(repository::history_count(&conn, "U100").unwrap(), 0);

        // Files are not cleaned up by deletion.
        let on_disk = dir
            .path()
            .join("uploads")
            .join(path.trim_start_matches(UPLOAD_PREFIX));
        assert!(on_disk.exists());
    }

    #[test]
    fn delete_missing_record_is_not_found() {
        let (_dir, manager, mut conn) = setup();
        let result = manager.delete_record(&mut conn, &nurse(), "GHOST");
        assert!(matches!(result, Err(LifecycleError::NotFound { .. })));
    }

    #[test]
    fn record_and_history_timestamps_share_one_time_base() {
        // created_at comes from the process clock, the history timestamp from
        // SQLite's datetime('now'). Both are UTC; in any zone they must agree
        // to within clock skew, not by a zone offset.
        let (_dir, manager, mut conn) = setup();
        manager.submit_as_nurse(&mut conn, &nurse(), nurse_intake("U100")).unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        let history = manager.history_for_record(&conn, "U100").unwrap();
        let drift = (record.created_at - history[0].timestamp).num_seconds().abs();
        assert!(drift <= 5, "record and history clocks disagree by {drift}s");
    }

    #[test]
    fn specimen_types_listed_alphabetically() {
        let (_dir, manager, conn) = setup();
        manager.add_specimen_type(&conn, "Hysterectomy specimen").unwrap();
        manager.add_specimen_type(&conn, "Biopsy").unwrap();

        let types = manager.list_specimen_types(&conn).unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].name, "Biopsy");
        assert_eq!(types[1].name, "Hysterectomy specimen");
    }

    #[test]
    fn add_specimen_type_requires_name() {
        let (_dir, manager, conn) = setup();
        let result = manager.add_specimen_type(&conn, "   ");
        assert!(matches!(
            result,
            Err(LifecycleError::Validation { field: "name" })
        ));
    }

    #[test]
    fn add_existing_specimen_type_returns_existing_entry() {
        let (_dir, manager, conn) = setup();
        let first = manager.add_specimen_type(&conn, "Biopsy").unwrap();

        // Same name in a different case resolves to the same entry.
        let again = manager.add_specimen_type(&conn, "BIOPSY").unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.name, "Biopsy");
        assert_eq!(manager.list_specimen_types(&conn).unwrap().len(), 1);
    }

    #[test]
    fn remove_specimen_type_leaves_records_untouched() {
        let (_dir, manager, mut conn) = setup();
        let biopsy = manager.add_specimen_type(&conn, "Biopsy").unwrap();

        let mut intake = nurse_intake("U100");
        intake.specimen_name = Some("Biopsy".into());
        manager.submit_as_nurse(&mut conn, &nurse(), intake).unwrap();

        manager.remove_specimen_type(&conn, biopsy.id).unwrap();
        assert!(manager.list_specimen_types(&conn).unwrap().is_empty());

        // The record keeps the name it was submitted with.
        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.specimen_name.as_deref(), Some("Biopsy"));

        let result = manager.remove_specimen_type(&conn, biopsy.id);
        assert!(matches!(
            result,
            Err(LifecycleError::Store(DatabaseError::NotFound { .. }))
        ));
    }

    #[test]
    fn draft_then_review_worked_example() {
        let (_dir, manager, mut conn) = setup();
        let uhid = manager.create_draft(&mut conn, &nurse(), draft_input("U100")).unwrap();
        assert_eq!(uhid, "U100");

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.status, FormStatus::Draft);

        manager
            .review_as_doctor(&mut conn, &doctor(), "U100", doctor_review())
            .unwrap();

        let record = manager.get_record(&conn, "U100").unwrap().unwrap();
        assert_eq!(record.status, FormStatus::DoctorReviewed);

        let history = manager.history_for_record(&conn, "U100").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[1].action, HistoryAction::Reviewed);
    }
}
