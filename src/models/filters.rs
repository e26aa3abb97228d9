use chrono::NaiveDate;

/// Search/listing filter for the requisition register.
///
/// String filters are substring matches; dates bound the form date
/// inclusively. `limit`/`offset` page the result set.
#[derive(Debug, Default)]
pub struct RequisitionFilter {
    pub uhid: Option<String>,
    pub name: Option<String>,
    pub lab_ref_no: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
