//! Certification form: field values, validation and period change tracking.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::service::SubmissionRequest;

/// Wire format of the period
pub const PERIODO_FORMAT: &str = "%d/%m/%Y";

/// Input formats accepted when parsing a period typed by the operator
const INPUT_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormError {
    #[error("Invalid date '{0}' (expected YYYY-MM-DD or DD/MM/YYYY)")]
    InvalidDate(String),
}

/// Parse a period typed as `YYYY-MM-DD` or `DD/MM/YYYY`
pub fn parse_periodo(input: &str) -> Result<NaiveDate, FormError> {
    let input = input.trim();
    INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .ok_or_else(|| FormError::InvalidDate(input.to_string()))
}

pub fn format_periodo(date: NaiveDate) -> String {
    date.format(PERIODO_FORMAT).to_string()
}

pub fn is_first_day_of_month(date: NaiveDate) -> bool {
    date.day() == 1
}

/// The two required fields of the screen
#[derive(Debug, Clone, Default)]
pub struct CertificationForm {
    periodo: Option<NaiveDate>,
    codigo: String,
    first_day_only: bool,
}

impl CertificationForm {
    pub fn new(first_day_only: bool) -> Self {
        Self {
            first_day_only,
            ..Default::default()
        }
    }

    pub fn periodo(&self) -> Option<NaiveDate> {
        self.periodo
    }

    pub fn codigo(&self) -> &str {
        &self.codigo
    }

    pub fn set_periodo(&mut self, periodo: Option<NaiveDate>) {
        self.periodo = periodo;
    }

    pub fn set_codigo(&mut self, codigo: impl Into<String>) {
        self.codigo = codigo.into();
    }

    pub fn periodo_valid(&self) -> bool {
        match self.periodo {
            Some(date) => !self.first_day_only || is_first_day_of_month(date),
            None => false,
        }
    }

    pub fn codigo_valid(&self) -> bool {
        !self.codigo.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.periodo_valid() && self.codigo_valid()
    }

    /// Build the request body, or `None` when the form is invalid
    pub fn to_request(&self) -> Option<SubmissionRequest> {
        if !self.is_valid() {
            return None;
        }
        let periodo = self.periodo?;
        Some(SubmissionRequest {
            periodo: format_periodo(periodo),
            codigo: self.codigo.clone(),
        })
    }

    /// Human-readable reasons the form is invalid
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        match self.periodo {
            None => problems.push("periodo is required"),
            Some(_) if !self.periodo_valid() => {
                problems.push("periodo must be the first day of a month")
            }
            Some(_) => {}
        }
        if !self.codigo_valid() {
            problems.push("codigo is required");
        }
        problems
    }
}

/// Change stream that drops consecutive duplicates and can be cancelled
#[derive(Debug)]
pub struct DistinctChanges<T> {
    last: Option<T>,
    cancelled: bool,
}

impl<T> Default for DistinctChanges<T> {
    fn default() -> Self {
        Self {
            last: None,
            cancelled: false,
        }
    }
}

impl<T: PartialEq + Clone> DistinctChanges<T> {
    /// Offer a new value. Returns true when it must be handled.
    pub fn push(&mut self, value: T) -> bool {
        if self.cancelled || self.last.as_ref() == Some(&value) {
            return false;
        }
        self.last = Some(value);
        true
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_periodo() {
        assert_eq!(parse_periodo("2024-01-01"), Ok(date(2024, 1, 1)));
        assert_eq!(parse_periodo(" 01/02/2024 "), Ok(date(2024, 2, 1)));
        assert!(parse_periodo("2024-02-30").is_err());
        assert!(parse_periodo("31/04/2024").is_err());
        assert!(parse_periodo("yesterday").is_err());
    }

    #[test]
    fn test_format_periodo() {
        assert_eq!(format_periodo(date(2024, 1, 1)), "01/01/2024");
        assert_eq!(format_periodo(date(2023, 12, 1)), "01/12/2023");
    }

    #[test]
    fn test_validation() {
        let mut form = CertificationForm::new(true);
        assert!(!form.is_valid());
        assert_eq!(form.problems(), vec!["periodo is required", "codigo is required"]);

        form.set_periodo(Some(date(2024, 1, 15)));
        form.set_codigo("A1");
        assert!(!form.periodo_valid());
        assert!(form.codigo_valid());
        assert_eq!(form.problems(), vec!["periodo must be the first day of a month"]);

        form.set_periodo(Some(date(2024, 1, 1)));
        assert!(form.is_valid());
        assert!(form.problems().is_empty());

        form.set_codigo("");
        assert!(!form.is_valid());
        assert_eq!(form.problems(), vec!["codigo is required"]);
    }

    #[test]
    fn test_codigo_only_requires_a_value() {
        let mut form = CertificationForm::new(true);
        form.set_periodo(Some(date(2024, 1, 1)));
        form.set_codigo("  ");
        assert!(form.codigo_valid());
        assert_eq!(
            form.to_request().map(|r| r.codigo),
            Some("  ".to_string())
        );
    }

    #[test]
    fn test_any_day_when_rule_disabled() {
        let mut form = CertificationForm::new(false);
        form.set_periodo(Some(date(2024, 1, 15)));
        form.set_codigo("A1");
        assert!(form.is_valid());
    }

    #[test]
    fn test_to_request() {
        let mut form = CertificationForm::new(true);
        form.set_codigo("A1");
        assert_eq!(form.to_request(), None);

        form.set_periodo(Some(date(2024, 1, 1)));
        assert_eq!(
            form.to_request(),
            Some(SubmissionRequest {
                periodo: "01/01/2024".to_string(),
                codigo: "A1".to_string(),
            })
        );
    }

    #[test]
    fn test_distinct_changes() {
        let mut changes = DistinctChanges::default();
        let a = Some(date(2024, 1, 1));
        let b = Some(date(2024, 2, 1));

        assert!(changes.push(a));
        assert!(!changes.push(a));
        assert!(!changes.push(a));
        assert!(changes.push(b));
        assert!(changes.push(a));
        assert!(changes.push(None));
        assert!(!changes.push(None));

        changes.cancel();
        assert!(!changes.push(b));
        assert!(!changes.push(None));
    }
}
