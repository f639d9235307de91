//! Flat-file export: three CSV tables plus the full JSON report.
//!
//! Every file is rendered in memory, written to a hidden temporary file in
//! the destination directory and renamed into place.

use std::path::{Path, PathBuf};

use leadscout_shared::{Company, LeadReport, LeadScoutError, Result};
use tracing::{debug, info, instrument};

const STEM_MAX_CHARS: usize = 40;

pub const COMPANY_COLUMNS: &[&str] = &[
    "company_name",
    "normalized_key",
    "company_type",
    "website",
    "therapeutic_areas",
    "fit_score",
    "fit_reason",
    "trial_id",
    "trial_phase",
    "trial_status",
    "trial_sponsor",
    "trial_condition",
    "decision_maker_count",
];

pub const DECISION_MAKER_COLUMNS: &[&str] =
    &["company_name", "name", "title", "contact", "research_notes"];

pub const EMAIL_COLUMNS: &[&str] = &[
    "company_name",
    "contact_name",
    "contact_title",
    "contact",
    "subject",
    "body",
    "review_state",
    "word_count",
    "over_budget",
];

/// Where one export landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub companies: PathBuf,
    pub decision_makers: PathBuf,
    pub emails: PathBuf,
    pub report: PathBuf,
}

impl ExportPaths {
    fn new(dest: &Path, stem: &str) -> Self {
        Self {
            companies: dest.join(format!("{stem}_companies.csv")),
            decision_makers: dest.join(format!("{stem}_decision_makers.csv")),
            emails: dest.join(format!("{stem}_emails.csv")),
            report: dest.join(format!("{stem}_report.json")),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.companies,
            &self.decision_makers,
            &self.emails,
            &self.report,
        ]
    }
}

/// File stem for a query: lowercase alphanumerics joined by `_`, at most 40 chars.
pub fn export_stem(query: &str) -> String {
    let mut stem = String::new();
    for ch in query.chars() {
        if ch.is_ascii_alphanumeric() {
            stem.push(ch.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem: String = stem.chars().take(STEM_MAX_CHARS).collect();
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        "leads".to_string()
    } else {
        stem.to_string()
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn csv_bytes(path: &Path, header: &[&str], rows: Vec<Vec<String>>) -> Result<Vec<u8>> {
    let err = |e: &dyn std::fmt::Display| LeadScoutError::export(path, format!("CSV encoding failed: {e}"));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(|e| err(&e))?;
    for row in rows {
        writer.write_record(&row).map_err(|e| err(&e))?;
    }
    writer.into_inner().map_err(|e| err(&e))
}

fn company_rows(report: &LeadReport) -> Vec<Vec<String>> {
    report
        .companies
        .iter()
        .map(|c| {
            let trial = c.trial.as_ref();
            vec![
                c.name.clone(),
                c.key.clone(),
                c.company_type.to_string(),
                c.website.as_ref().map(|u| u.to_string()).unwrap_or_default(),
                c.therapeutic_areas.iter().cloned().collect::<Vec<_>>().join("; "),
                c.fit_score.to_string(),
                c.fit_reason.clone(),
                trial.map(|t| t.id.clone()).unwrap_or_default(),
                trial.and_then(|t| t.phase.clone()).unwrap_or_default(),
                trial.map(|t| t.status.to_string()).unwrap_or_default(),
                trial.and_then(|t| t.sponsor.clone()).unwrap_or_default(),
                trial.and_then(|t| t.condition.clone()).unwrap_or_default(),
                c.decision_makers.len().to_string(),
            ]
        })
        .collect()
}

fn decision_maker_rows(report: &LeadReport) -> Vec<Vec<String>> {
    report
        .companies
        .iter()
        .flat_map(|c| {
            c.decision_makers.iter().map(move |dm| {
                vec![
                    c.name.clone(),
                    dm.name.clone(),
                    dm.title.clone(),
                    dm.contact.as_ref().map(|h| h.to_string()).unwrap_or_default(),
                    dm.research_notes.clone().unwrap_or_default(),
                ]
            })
        })
        .collect()
}

/// Approved and edited drafts only.
fn email_rows(report: &LeadReport) -> Vec<Vec<String>> {
    report
        .drafts
        .iter()
        .filter(|d| d.state.is_exportable())
        .map(|d| {
            let company: Option<&Company> = report.company(&d.target.company_key);
            let contact = company.and_then(|c| c.decision_maker(&d.target.contact_name));
            vec![
                company.map_or_else(|| d.target.company_key.clone(), |c| c.name.clone()),
                d.target.contact_name.clone(),
                contact.map(|dm| dm.title.clone()).unwrap_or_default(),
                contact
                    .and_then(|dm| dm.contact.as_ref())
                    .map(|h| h.to_string())
                    .unwrap_or_default(),
                d.subject.clone(),
                d.body.clone(),
                d.state.to_string(),
                d.word_count.to_string(),
                d.over_budget.to_string(),
            ]
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `bytes` to `target` through a hidden temp file in the same directory.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let filename = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LeadScoutError::export(target, "not a file path"))?;
    let temp = dir.join(format!(".{filename}.tmp"));

    let written = std::fs::write(&temp, bytes).and_then(|()| std::fs::rename(&temp, target));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(LeadScoutError::export(target, e.to_string()));
    }
    debug!(path = %target.display(), size = bytes.len(), "wrote export file");
    Ok(())
}

/// Export `report` into `dest`, creating the directory if needed.
#[instrument(skip_all, fields(dest = %dest.display(), companies = report.companies.len()))]
pub fn write_report(report: &LeadReport, dest: &Path) -> Result<ExportPaths> {
    std::fs::create_dir_all(dest).map_err(|e| LeadScoutError::export(dest, e.to_string()))?;
    let paths = ExportPaths::new(dest, &export_stem(&report.query));

    // Render everything before touching the destination.
    let companies = csv_bytes(&paths.companies, COMPANY_COLUMNS, company_rows(report))?;
    let people = csv_bytes(
        &paths.decision_makers,
        DECISION_MAKER_COLUMNS,
        decision_maker_rows(report),
    )?;
    let emails = csv_bytes(&paths.emails, EMAIL_COLUMNS, email_rows(report))?;
    let json = serde_json::to_vec_pretty(report)
        .map_err(|e| LeadScoutError::export(&paths.report, format!("JSON encoding failed: {e}")))?;

    write_atomic(&paths.companies, &companies)?;
    write_atomic(&paths.decision_makers, &people)?;
    write_atomic(&paths.emails, &emails)?;
    write_atomic(&paths.report, &json)?;

    info!(stem = %export_stem(&report.query), "export complete");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_shared::ReviewState;

    fn fixture() -> LeadReport {
        let json = include_str!("../../../../fixtures/json/report.fixture.json");
        LeadReport::from_json(json).expect("fixture parses")
    }

    fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).expect("open csv");
        let header = reader
            .headers()
            .expect("header")
            .iter()
            .map(String::from)
            .collect();
        let rows = reader
            .records()
            .map(|r| r.expect("row").iter().map(String::from).collect())
            .collect();
        (header, rows)
    }

    #[test]
    fn stems() {
        assert_eq!(export_stem("Diabetes phase 2 failures"), "diabetes_phase_2_failures");
        assert_eq!(export_stem("  GLP-1 / obesity!! "), "glp_1_obesity");
        assert_eq!(export_stem("???"), "leads");
        let long = export_stem(&"a".repeat(100));
        assert_eq!(long.len(), 40);
    }

    #[test]
    fn writes_all_four_files() {
        let tmp = tempfile::tempdir().unwrap();
        let report = fixture();
        let paths = write_report(&report, tmp.path()).unwrap();
        for p in paths.all() {
            assert!(p.exists(), "{}", p.display());
        }

        let (header, rows) = read_csv(&paths.companies);
        assert_eq!(header, COMPANY_COLUMNS);
        assert_eq!(rows.len(), report.companies.len());
        for row in &rows {
            assert_eq!(row[2], "biotech");
            let score: u8 = row[5].parse().unwrap();
            assert!(score <= 100);
        }

        let (header, rows) = read_csv(&paths.emails);
        assert_eq!(header, EMAIL_COLUMNS);
        // Only the approved draft is exported.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "approved");

        let back = LeadReport::from_json(&std::fs::read_to_string(&paths.report).unwrap()).unwrap();
        assert_eq!(back.drafts.len(), report.drafts.len());

        // No temp files left behind.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn venture_firms_are_labelled() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = fixture();
        report.companies[1].company_type = leadscout_shared::CompanyType::VcFirm;
        let paths = write_report(&report, tmp.path()).unwrap();
        let (_, rows) = read_csv(&paths.companies);
        assert_eq!(rows[1][2], "vc_firm");

        let back = LeadReport::from_json(&std::fs::read_to_string(&paths.report).unwrap()).unwrap();
        assert_eq!(back.companies[1].company_type, leadscout_shared::CompanyType::VcFirm);
    }

    #[test]
    fn zero_approved_drafts_gives_header_only_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let mut report = fixture();
        for d in &mut report.drafts {
            d.state = ReviewState::Skipped;
        }
        let paths = write_report(&report, tmp.path()).unwrap();
        let text = std::fs::read_to_string(&paths.emails).unwrap();
        assert_eq!(text.trim_end(), EMAIL_COLUMNS.join(","));
    }

    #[test]
    fn empty_report_still_has_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let report = LeadReport::new("nothing found", "test");
        let paths = write_report(&report, tmp.path()).unwrap();
        let (header, rows) = read_csv(&paths.decision_makers);
        assert_eq!(header, DECISION_MAKER_COLUMNS);
        assert!(rows.is_empty());
    }

    #[test]
    fn unwritable_destination_is_export_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let err = write_report(&fixture(), &blocker.join("sub")).unwrap_err();
        assert!(matches!(err, LeadScoutError::Export { .. }));
    }
}
