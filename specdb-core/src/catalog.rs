//! Catalog number derivation
//!
//! A specimen's catalog number is `YYYY-LOC-NNNN`: collection year, locality
//! code and the specimen number zero-padded to four digits. It is never
//! typed in directly.

use crate::filter::zero_fill;
use crate::record::Record;
use crate::validation::ValidationError;

/// Fields a catalog number is built from, in the order missing ones are reported.
pub const CATALOG_PARTS: [&str; 3] = ["specimenNumber", "year", "locality"];

/// Width the specimen number is padded to.
pub const SPECIMEN_NUMBER_WIDTH: usize = 4;

/// Build a catalog number from its parts.
pub fn format_catalog_number(year: &str, locality: &str, specimen_number: &str) -> String {
    format!(
        "{}-{}-{}",
        year.trim(),
        locality.trim(),
        zero_fill(specimen_number.trim(), SPECIMEN_NUMBER_WIDTH)
    )
}

/// Parts missing from `record`.
pub fn missing_parts(record: &Record) -> Vec<&'static str> {
    CATALOG_PARTS
        .into_iter()
        .filter(|f| !record.contains(f))
        .collect()
}

/// Derive the catalog number for `record`.
pub fn derive_catalog_number(record: &Record) -> Result<String, ValidationError> {
    let missing = missing_parts(record);
    if !missing.is_empty() {
        return Err(ValidationError::Rule {
            field: "catalogNumber",
            message: format!(
                "cannot generate catalog number, missing {}",
                missing.join(", ")
            ),
        });
    }
    Ok(format_catalog_number(
        record.get("year").unwrap_or_default(),
        record.get("locality").unwrap_or_default(),
        record.get("specimenNumber").unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_specimen_number() {
        assert_eq!(format_catalog_number("2023", "KL", "7"), "2023-KL-0007");
        assert_eq!(format_catalog_number("2023", "KL", "12345"), "2023-KL-12345");
    }

    #[test]
    fn reports_every_missing_part() {
        let record: Record = [("year", "2023")].into_iter().collect();
        let err = derive_catalog_number(&record).unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot generate catalog number, missing specimenNumber, locality"
        );
    }

    #[test]
    fn derives_from_record() {
        let record: Record = [("year", "2024"), ("locality", "FLP"), ("specimenNumber", "42")]
            .into_iter()
            .collect();
        assert_eq!(derive_catalog_number(&record).unwrap(), "2024-FLP-0042");
    }
}
