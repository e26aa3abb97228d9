use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};

use crate::db::DatabaseError;
use crate::models::enums::FormStatus;
use crate::models::filters::RequisitionFilter;
use crate::models::requisition::RequisitionRecord;

const REQUISITION_COLUMNS: &str =
    "uhid, lab_ref_no, form_date, patient_name, age, gender, cr_no, opd_ipd, ipd_no,
     consultant, clinical_diagnosis, menses_onset, menses_cycle, lasting_days, character,
     lmp, gravida, para, menopause_age, menopause_years, hormone_therapy,
     xray_usg_ct_mri_findings, laboratory_findings, operative_findings,
     post_operative_diagnosis, previous_hp_cyt_report, specimen_name, collected_at,
     received_at, processed_at, specimens_received, specimen_no, micro_section_no,
     special_stains, gross_description, microscopic_examination, impression, pathologist,
     pathologist_date, advice, uploaded_file_paths, signature_image, status, created_by,
     reviewed_by, reviewed_at, created_at, updated_at";

pub fn insert_requisition(
    conn: &Connection,
    rec: &RequisitionRecord,
) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO requisitions ({REQUISITION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                     ?29, ?30, ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40, ?41,
                     ?42, ?43, ?44, ?45, ?46, ?47, ?48)"
        ),
        params![
            rec.uhid,
            rec.lab_ref_no,
            rec.date.to_string(),
            rec.name,
            rec.age,
            rec.gender,
            rec.cr_no,
            rec.opd_ipd,
            rec.ipd_no,
            rec.consultant,
            rec.clinical_diagnosis,
            rec.menses_onset,
            rec.menses_cycle,
            rec.lasting_days,
            rec.character,
            rec.lmp,
            rec.gravida,
            rec.para,
            rec.menopause_age,
            rec.menopause_years,
            rec.hormone_therapy,
            rec.xray_usg_ct_mri_findings,
            rec.laboratory_findings,
            rec.operative_findings,
            rec.post_operative_diagnosis,
            rec.previous_hp_cyt_report,
            rec.specimen_name,
            rec.collected_at.to_string(),
            rec.received_at.to_string(),
            rec.processed_at.to_string(),
            rec.specimens_received,
            rec.specimen_no,
            rec.micro_section_no,
            rec.special_stains,
            rec.gross_description,
            rec.microscopic_examination,
            rec.impression,
            rec.pathologist,
            rec.pathologist_date.to_string(),
            rec.advice,
            rec.uploaded_file_paths,
            rec.signature_image,
            rec.status.as_str(),
            rec.created_by,
            rec.reviewed_by,
            rec.reviewed_at.map(|t| t.to_string()),
            rec.created_at.to_string(),
            rec.updated_at.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_requisition(
    conn: &Connection,
    uhid: &str,
) -> Result<Option<RequisitionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUISITION_COLUMNS} FROM requisitions WHERE uhid = ?1"
    ))?;

    match stmt.query_row(params![uhid], map_row) {
        Ok(row) => Ok(Some(requisition_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn requisition_exists(conn: &Connection, uhid: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM requisitions WHERE uhid = ?1",
        params![uhid],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Persist every mutable field of the record.
///
/// `uhid`, `created_by` and `created_at` are deliberately absent from the
/// SET list; they are written once at insert and never change.
pub fn update_requisition(
    conn: &Connection,
    rec: &RequisitionRecord,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE requisitions SET
             lab_ref_no = ?2, form_date = ?3, patient_name = ?4, age = ?5, gender = ?6,
             cr_no = ?7, opd_ipd = ?8, ipd_no = ?9, consultant = ?10,
             clinical_diagnosis = ?11, menses_onset = ?12, menses_cycle = ?13,
             lasting_days = ?14, character = ?15, lmp = ?16, gravida = ?17, para = ?18,
             menopause_age = ?19, menopause_years = ?20, hormone_therapy = ?21,
             xray_usg_ct_mri_findings = ?22, laboratory_findings = ?23,
             operative_findings = ?24, post_operative_diagnosis = ?25,
             previous_hp_cyt_report = ?26, specimen_name = ?27, collected_at = ?28,
             received_at = ?29, processed_at = ?30, specimens_received = ?31,
             specimen_no = ?32, micro_section_no = ?33, special_stains = ?34,
             gross_description = ?35, microscopic_examination = ?36, impression = ?37,
             pathologist = ?38, pathologist_date = ?39, advice = ?40,
             uploaded_file_paths = ?41, signature_image = ?42, status = ?43,
             reviewed_by = ?44, reviewed_at = ?45, updated_at = ?46
         WHERE uhid = ?1",
        params![
            rec.uhid,
            rec.lab_ref_no,
            rec.date.to_string(),
            rec.name,
            rec.age,
            rec.gender,
            rec.cr_no,
            rec.opd_ipd,
            rec.ipd_no,
            rec.consultant,
            rec.clinical_diagnosis,
            rec.menses_onset,
            rec.menses_cycle,
            rec.lasting_days,
            rec.character,
            rec.lmp,
            rec.gravida,
            rec.para,
            rec.menopause_age,
            rec.menopause_years,
            rec.hormone_therapy,
            rec.xray_usg_ct_mri_findings,
            rec.laboratory_findings,
            rec.operative_findings,
            rec.post_operative_diagnosis,
            rec.previous_hp_cyt_report,
            rec.specimen_name,
            rec.collected_at.to_string(),
            rec.received_at.to_string(),
            rec.processed_at.to_string(),
            rec.specimens_received,
            rec.specimen_no,
            rec.micro_section_no,
            rec.special_stains,
            rec.gross_description,
            rec.microscopic_examination,
            rec.impression,
            rec.pathologist,
            rec.pathologist_date.to_string(),
            rec.advice,
            rec.uploaded_file_paths,
            rec.signature_image,
            rec.status.as_str(),
            rec.reviewed_by,
            rec.reviewed_at.map(|t| t.to_string()),
            rec.updated_at.to_string(),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Requisition".into(),
            id: rec.uhid.clone(),
        });
    }
    Ok(())
}

/// List requisitions matching the filter, newest form date first.
pub fn list_requisitions(
    conn: &Connection,
    filter: &RequisitionFilter,
) -> Result<Vec<RequisitionRecord>, DatabaseError> {
    let mut sql = format!("SELECT {REQUISITION_COLUMNS} FROM requisitions");
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(uhid) = &filter.uhid {
        values.push(Box::new(format!("%{uhid}%")));
        clauses.push(format!("uhid LIKE ?{}", values.len()));
    }
    if let Some(name) = &filter.name {
        values.push(Box::new(format!("%{name}%")));
        clauses.push(format!("patient_name LIKE ?{}", values.len()));
    }
    if let Some(lab_ref_no) = &filter.lab_ref_no {
        values.push(Box::new(format!("%{lab_ref_no}%")));
        clauses.push(format!("lab_ref_no LIKE ?{}", values.len()));
    }
    if let Some(from) = &filter.date_from {
        values.push(Box::new(from.to_string()));
        clauses.push(format!("form_date >= ?{}", values.len()));
    }
    if let Some(to) = &filter.date_to {
        values.push(Box::new(to.to_string()));
        clauses.push(format!("form_date <= ?{}", values.len()));
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY form_date DESC, uhid");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = filter.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), map_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(requisition_from_row(row?)?);
    }
    Ok(records)
}

/// Delete a requisition and its history rows.
///
/// The FK carries ON DELETE CASCADE, but history is deleted explicitly so the
/// removed row count can be logged. Returns the number of history rows
/// removed. Attachment files on disk are NOT touched here.
pub fn delete_requisition_cascade(
    conn: &Connection,
    uhid: &str,
) -> Result<usize, DatabaseError> {
    let history_rows = conn.execute(
        "DELETE FROM form_history WHERE uhid = ?1",
        params![uhid],
    )?;
    let deleted = conn.execute("DELETE FROM requisitions WHERE uhid = ?1", params![uhid])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Requisition".into(),
            id: uhid.to_string(),
        });
    }

    tracing::info!(uhid = %uhid, history_rows, "Requisition deleted with its history");
    Ok(history_rows)
}

// Internal row type for RequisitionRecord mapping
struct RequisitionRow {
    uhid: String,
    lab_ref_no: String,
    form_date: String,
    patient_name: String,
    age: i32,
    gender: String,
    cr_no: String,
    opd_ipd: String,
    ipd_no: String,
    consultant: String,
    clinical_diagnosis: String,
    menses_onset: Option<i32>,
    menses_cycle: Option<i32>,
    lasting_days: Option<i32>,
    character: String,
    lmp: String,
    gravida: String,
    para: String,
    menopause_age: Option<i32>,
    menopause_years: Option<i32>,
    hormone_therapy: String,
    xray_usg_ct_mri_findings: String,
    laboratory_findings: String,
    operative_findings: String,
    post_operative_diagnosis: String,
    previous_hp_cyt_report: String,
    specimen_name: Option<String>,
    collected_at: String,
    received_at: String,
    processed_at: String,
    specimens_received: i32,
    specimen_no: String,
    micro_section_no: String,
    special_stains: String,
    gross_description: String,
    microscopic_examination: String,
    impression: Option<String>,
    pathologist: Option<String>,
    pathologist_date: String,
    advice: String,
    uploaded_file_paths: String,
    signature_image: Option<String>,
    status: String,
    created_by: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<RequisitionRow> {
    Ok(RequisitionRow {
        uhid: row.get(0)?,
        lab_ref_no: row.get(1)?,
        form_date: row.get(2)?,
        patient_name: row.get(3)?,
        age: row.get(4)?,
        gender: row.get(5)?,
        cr_no: row.get(6)?,
        opd_ipd: row.get(7)?,
        ipd_no: row.get(8)?,
        consultant: row.get(9)?,
        clinical_diagnosis: row.get(10)?,
        menses_onset: row.get(11)?,
        menses_cycle: row.get(12)?,
        lasting_days: row.get(13)?,
        character: row.get(14)?,
        lmp: row.get(15)?,
        gravida: row.get(16)?,
        para: row.get(17)?,
        menopause_age: row.get(18)?,
        menopause_years: row.get(19)?,
        hormone_therapy: row.get(20)?,
        xray_usg_ct_mri_findings: row.get(21)?,
        laboratory_findings: row.get(22)?,
        operative_findings: row.get(23)?,
        post_operative_diagnosis: row.get(24)?,
        previous_hp_cyt_report: row.get(25)?,
        specimen_name: row.get(26)?,
        collected_at: row.get(27)?,
        received_at: row.get(28)?,
        processed_at: row.get(29)?,
        specimens_received: row.get(30)?,
        specimen_no: row.get(31)?,
        micro_section_no: row.get(32)?,
        special_stains: row.get(33)?,
        gross_description: row.get(34)?,
        microscopic_examination: row.get(35)?,
        impression: row.get(36)?,
        pathologist: row.get(37)?,
        pathologist_date: row.get(38)?,
        advice: row.get(39)?,
        uploaded_file_paths: row.get(40)?,
        signature_image: row.get(41)?,
        status: row.get(42)?,
        created_by: row.get(43)?,
        reviewed_by: row.get(44)?,
        reviewed_at: row.get(45)?,
        created_at: row.get(46)?,
        updated_at: row.get(47)?,
    })
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .unwrap_or_default()
}

fn requisition_from_row(row: RequisitionRow) -> Result<RequisitionRecord, DatabaseError> {
    Ok(RequisitionRecord {
        uhid: row.uhid,
        lab_ref_no: row.lab_ref_no,
        date: parse_date(&row.form_date),
        name: row.patient_name,
        age: row.age,
        gender: row.gender,
        cr_no: row.cr_no,
        opd_ipd: row.opd_ipd,
        ipd_no: row.ipd_no,
        consultant: row.consultant,
        clinical_diagnosis: row.clinical_diagnosis,
        menses_onset: row.menses_onset,
        menses_cycle: row.menses_cycle,
        lasting_days: row.lasting_days,
        character: row.character,
        lmp: row.lmp,
        gravida: row.gravida,
        para: row.para,
        menopause_age: row.menopause_age,
        menopause_years: row.menopause_years,
        hormone_therapy: row.hormone_therapy,
        xray_usg_ct_mri_findings: row.xray_usg_ct_mri_findings,
        laboratory_findings: row.laboratory_findings,
        operative_findings: row.operative_findings,
        post_operative_diagnosis: row.post_operative_diagnosis,
        previous_hp_cyt_report: row.previous_hp_cyt_report,
        specimen_name: row.specimen_name,
        collected_at: parse_datetime(&row.collected_at),
        received_at: parse_datetime(&row.received_at),
        processed_at: parse_datetime(&row.processed_at),
        specimens_received: row.specimens_received,
        specimen_no: row.specimen_no,
        micro_section_no: row.micro_section_no,
        special_stains: row.special_stains,
        gross_description: row.gross_description,
        microscopic_examination: row.microscopic_examination,
        impression: row.impression,
        pathologist: row.pathologist,
        pathologist_date: parse_datetime(&row.pathologist_date),
        advice: row.advice,
        uploaded_file_paths: row.uploaded_file_paths,
        signature_image: row.signature_image,
        status: FormStatus::from_str(&row.status)?,
        created_by: row.created_by,
        reviewed_by: row.reviewed_by,
        reviewed_at: row.reviewed_at.map(|t| parse_datetime(&t)),
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
    })
}
