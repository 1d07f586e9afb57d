//! Filter expressions and predicate composition
//!
//! Query parameters double as filter expressions. A value is a
//! comma-separated list of parts; each part is either a single value or,
//! on range-capable fields, a `start:end` range:
//!
//! ```text
//! year=2020, 2022:2025
//! specimenNumber=1:3, 20
//! catalogNumber=2023-KL-0010:0200
//! ```
//!
//! Parsing never fails. A malformed range degrades to a substring match on
//! the raw part. The result is a [`Predicate`] tree that the server renders
//! to SQL and that [`Predicate::matches`] can evaluate in memory.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::record::Record;
use crate::schema::{EntityKind, EntitySchema};

/// Text fields that hold integers and get enumerated ranges.
pub const NUMERIC_TEXT_FIELDS: &[&str] = &["year", "specimenNumber"];

/// Ranges wider than this are matched by numeric cast instead of by
/// enumerating every value.
pub const MAX_ENUMERATED_RANGE: i64 = 10_000;

/// Composable boolean condition over the fields of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// No condition.
    All,
    /// Matches nothing.
    Nothing,
    /// Case-insensitive equality.
    IExact { field: String, value: String },
    /// Equality with any of `values`.
    In { field: String, values: Vec<String> },
    /// Case-insensitive substring.
    IContains { field: String, value: String },
    /// Lexicographic lower bound.
    Gte { field: String, value: String },
    /// Lexicographic upper bound.
    Lte { field: String, value: String },
    /// Value is all digits and its integer lies in `start..=end`.
    NumericBetween { field: String, start: i64, end: i64 },
    /// Value is `prefix` followed by one or more digits.
    DigitsAfter { field: String, prefix: String },
    StartsWith { field: String, value: String },
    /// Foreign key matched by the related natural key: exact when such a key
    /// exists, otherwise any related key containing `value`, otherwise nothing.
    Related {
        field: String,
        target: EntityKind,
        value: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction. `All` is the identity.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut a), Predicate::And(b)) => {
                a.extend(b);
                Predicate::And(a)
            }
            (Predicate::And(mut a), p) => {
                a.push(p);
                Predicate::And(a)
            }
            (p, Predicate::And(mut b)) => {
                b.insert(0, p);
                Predicate::And(b)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Disjunction of `parts`. An empty list is no condition.
    pub fn any(mut parts: Vec<Predicate>) -> Predicate {
        match parts.len() {
            0 => Predicate::All,
            1 => parts.remove(0),
            _ => Predicate::Or(parts),
        }
    }

    /// Conjunction of `parts`, dropping `All`.
    pub fn all(parts: Vec<Predicate>) -> Predicate {
        parts.into_iter().fold(Predicate::All, Predicate::and)
    }

    /// Names of every field this predicate touches.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::All | Predicate::Nothing => {}
            Predicate::IExact { field, .. }
            | Predicate::In { field, .. }
            | Predicate::IContains { field, .. }
            | Predicate::Gte { field, .. }
            | Predicate::Lte { field, .. }
            | Predicate::NumericBetween { field, .. }
            | Predicate::DigitsAfter { field, .. }
            | Predicate::StartsWith { field, .. }
            | Predicate::Related { field, .. } => out.push(field),
            Predicate::And(parts) | Predicate::Or(parts) => {
                for p in parts {
                    p.collect_fields(out);
                }
            }
        }
    }

    /// Evaluate against an in-memory record. NULL fields match no leaf.
    pub fn matches(&self, record: &Record, related: &RelatedKeys) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Nothing => false,
            Predicate::IExact { field, value } => record
                .get(field)
                .is_some_and(|v| v.to_lowercase() == value.to_lowercase()),
            Predicate::In { field, values } => {
                record.get(field).is_some_and(|v| values.iter().any(|x| x == v))
            }
            Predicate::IContains { field, value } => record
                .get(field)
                .is_some_and(|v| v.to_lowercase().contains(&value.to_lowercase())),
            Predicate::Gte { field, value } => {
                record.get(field).is_some_and(|v| v >= value.as_str())
            }
            Predicate::Lte { field, value } => {
                record.get(field).is_some_and(|v| v <= value.as_str())
            }
            Predicate::NumericBetween { field, start, end } => record
                .get(field)
                .and_then(parse_digits)
                .is_some_and(|n| n >= *start && n <= *end),
            Predicate::DigitsAfter { field, prefix } => record.get(field).is_some_and(|v| {
                v.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            }),
            Predicate::StartsWith { field, value } => {
                record.get(field).is_some_and(|v| v.starts_with(value.as_str()))
            }
            Predicate::Related {
                field,
                target,
                value,
            } => {
                let Some(current) = record.get(field) else {
                    return false;
                };
                let keys = related.keys(*target);
                if keys.iter().any(|k| k == value) {
                    return current == value;
                }
                let needle = value.to_lowercase();
                keys.iter()
                    .filter(|k| k.to_lowercase().contains(&needle))
                    .any(|k| k == current)
            }
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record, related)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(record, related)),
        }
    }
}

/// Natural keys of related entities, used for in-memory evaluation of
/// [`Predicate::Related`].
#[derive(Debug, Clone, Default)]
pub struct RelatedKeys(HashMap<EntityKind, Vec<String>>);

impl RelatedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: EntityKind, keys: Vec<String>) {
        self.0.insert(kind, keys);
    }

    pub fn keys(&self, kind: EntityKind) -> &[String] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Builds predicates from filter expressions.
pub struct FilterBuilder;

impl FilterBuilder {
    /// Parse a filter value for `field`.
    ///
    /// Blank values produce [`Predicate::All`]. Parts are OR-combined.
    pub fn parse_filter(field: &str, value: &str, range_support: bool) -> Predicate {
        if field.is_empty() || value.trim().is_empty() {
            return Predicate::All;
        }

        let parts = value
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|part| {
                if range_support && part.contains(':') {
                    Self::parse_range(field, part).unwrap_or_else(|| Predicate::IContains {
                        field: field.to_owned(),
                        value: part.to_owned(),
                    })
                } else {
                    Predicate::IExact {
                        field: field.to_owned(),
                        value: part.to_owned(),
                    }
                }
            })
            .collect();

        Predicate::any(parts)
    }

    /// `None` when the range is malformed.
    fn parse_range(field: &str, part: &str) -> Option<Predicate> {
        if field == "catalogNumber" && part.contains('-') {
            let (prefix_part, range_part) = part.rsplit_once('-')?;
            let prefix = format!("{prefix_part}-");
            let (start, end) = split_pair(range_part)?;

            let width = start.len().max(end.len());
            return Some(Predicate::all(vec![
                Predicate::DigitsAfter {
                    field: field.to_owned(),
                    prefix: prefix.clone(),
                },
                Predicate::Gte {
                    field: field.to_owned(),
                    value: format!("{prefix}{}", zero_fill(start, width)),
                },
                Predicate::Lte {
                    field: field.to_owned(),
                    value: format!("{prefix}{}", zero_fill(end, width)),
                },
            ]));
        }

        let (start, end) = split_pair(part)?;
        let (start, end) = (start.trim(), end.trim());

        if NUMERIC_TEXT_FIELDS.contains(&field) {
            if let (Ok(a), Ok(b)) = (start.parse::<i64>(), end.parse::<i64>()) {
                return Some(numeric_range(field, a, b));
            }
        }

        Some(Predicate::all(vec![
            Predicate::Gte {
                field: field.to_owned(),
                value: start.to_owned(),
            },
            Predicate::Lte {
                field: field.to_owned(),
                value: end.to_owned(),
            },
        ]))
    }

    /// Expand a year filter into individual years, in input order.
    ///
    /// Ranges become every year in the range; unparseable parts are kept as-is.
    pub fn extract_year_values(year_filter: &str) -> Vec<String> {
        let mut years = Vec::new();
        for part in year_filter.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if part.contains(':') {
                let bounds = split_pair(part)
                    .and_then(|(a, b)| Some((a.trim().parse::<i64>().ok()?, b.trim().parse::<i64>().ok()?)));
                match bounds {
                    Some((a, b)) if b.checked_sub(a).is_some_and(|d| d <= MAX_ENUMERATED_RANGE) => {
                        years.extend((a..=b).map(|y| y.to_string()));
                    }
                    _ => years.push(part.to_owned()),
                }
            } else {
                years.push(part.to_owned());
            }
        }
        years
    }

    /// Catalog numbers starting with any year of `year_filter`.
    pub fn catalog_number_by_year(year_filter: &str) -> Predicate {
        let parts = Self::extract_year_values(year_filter)
            .into_iter()
            .map(|year| Predicate::StartsWith {
                field: "catalogNumber".to_owned(),
                value: year,
            })
            .collect();
        Predicate::any(parts)
    }
}

fn split_pair(s: &str) -> Option<(&str, &str)> {
    let mut it = s.split(':');
    let (a, b) = (it.next()?, it.next()?);
    if it.next().is_some() {
        return None;
    }
    Some((a, b))
}

fn numeric_range(field: &str, start: i64, end: i64) -> Predicate {
    if end < start {
        return Predicate::Nothing;
    }
    if end.checked_sub(start).map_or(true, |d| d > MAX_ENUMERATED_RANGE) {
        return Predicate::NumericBetween {
            field: field.to_owned(),
            start,
            end,
        };
    }
    Predicate::In {
        field: field.to_owned(),
        values: (start..=end).map(|n| n.to_string()).collect(),
    }
}

/// Left-pad with zeros to `width`, like Python's `str.zfill`.
pub fn zero_fill(s: &str, width: usize) -> String {
    let (sign, digits) = match s.strip_prefix(['-', '+']) {
        Some(rest) => (&s[..1], rest),
        None => ("", s),
    };
    let pad = width.saturating_sub(s.len());
    format!("{sign}{}{digits}", "0".repeat(pad))
}

fn parse_digits(v: &str) -> Option<i64> {
    if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    v.parse().ok()
}

/// Sort key for integers stored as text: digit-only values sort by their
/// number, anything else sorts as zero.
pub fn numeric_sort_key(value: Option<&str>) -> i64 {
    value.and_then(parse_digits).unwrap_or(0)
}

/// Build the combined predicate for a list request.
///
/// Special fields are handled first with their range behavior; every other
/// schema field present in `params` gets a case-insensitive substring match,
/// or a natural-key match for foreign keys. Unknown parameters are ignored.
pub fn apply_model_filters(schema: &EntitySchema, params: &BTreeMap<String, String>) -> Predicate {
    let mut parts = Vec::new();

    for special in schema.special_filters {
        let Some(value) = params.get(special.key).filter(|v| !v.trim().is_empty()) else {
            continue;
        };
        parts.push(FilterBuilder::parse_filter(
            special.field,
            value,
            special.range_support,
        ));
        if special.catalog_year_prefix {
            parts.push(FilterBuilder::catalog_number_by_year(value));
        }
    }

    for field in schema.fields {
        if schema.special_filter(field.name).is_some() {
            continue;
        }
        let Some(value) = params.get(field.name).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
            continue;
        };
        let predicate = match field.foreign_key() {
            Some(target) => Predicate::Related {
                field: field.name.to_owned(),
                target,
                value: value.to_owned(),
            },
            None => Predicate::IContains {
                field: field.name.to_owned(),
                value: value.to_owned(),
            },
        };
        parts.push(predicate);
    }

    Predicate::all(parts)
}

/// One component of a list ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Integer stored as text, ordered by [`numeric_sort_key`].
    NumericText(&'static str),
    /// Ascending with NULLs after every value.
    AscNullsLast(&'static str),
    /// Ascending text.
    Asc(&'static str),
}

/// Default report ordering for an entity. Empty means primary-key order.
pub fn report_ordering(kind: EntityKind) -> &'static [SortKey] {
    match kind {
        EntityKind::Specimen => &[
            SortKey::NumericText("year"),
            SortKey::NumericText("specimenNumber"),
            SortKey::AscNullsLast("eventDate"),
            SortKey::Asc("month"),
            SortKey::Asc("day"),
        ],
        _ => &[],
    }
}

/// Compare two records by `keys`, the same way the SQL ordering does.
pub fn compare_records(a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = match key {
            SortKey::NumericText(f) => numeric_sort_key(a.get(f)).cmp(&numeric_sort_key(b.get(f))),
            SortKey::AscNullsLast(f) | SortKey::Asc(f) => match (a.get(f), b.get(f)) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Input hints for one filterable field.
#[derive(Debug, Clone, Serialize)]
pub struct FilterHint {
    pub field: &'static str,
    pub placeholder: String,
    pub help_text: &'static str,
    pub special: bool,
    pub range_support: bool,
}

/// Hints for every field of `schema`.
pub fn filter_hints(schema: &EntitySchema) -> Vec<FilterHint> {
    schema
        .fields
        .iter()
        .map(|field| {
            let (placeholder, help_text) = match field.name {
                "year" => (
                    "e.g., 2023, 2020:2025".to_owned(),
                    "Enter single year, range (2020:2025), or comma-separated values",
                ),
                "specimenNumber" => (
                    "e.g., 1, 5:10".to_owned(),
                    "Enter single number, range (1:100), or comma-separated values",
                ),
                "catalogNumber" => (
                    "e.g., 2023-FLP-0001".to_owned(),
                    "Enter catalog number or range (2023-FLP-0001:0010)",
                ),
                "locality" => (
                    "e.g., FLP, KL".to_owned(),
                    "Enter locality code(s), comma-separated",
                ),
                name => (format!("Filter by {name}"), "Enter search term"),
            };
            let special = schema.special_filter(field.name);
            FilterHint {
                field: field.name,
                placeholder,
                help_text,
                special: special.is_some(),
                range_support: special.is_some_and(|s| s.range_support),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SPECIMEN;

    fn specimen(catalog: &str, number: &str, year: &str, locality: &str) -> Record {
        [
            ("catalogNumber", catalog),
            ("specimenNumber", number),
            ("year", year),
            ("locality", locality),
        ]
        .into_iter()
        .collect()
    }

    fn fixtures() -> Vec<Record> {
        vec![
            specimen("2023-AA-0001", "1", "2023", "LOC1"),
            specimen("2023-AA-0002", "2", "2023", "LOC1"),
            specimen("2023-AA-0003", "3", "2023", "LOC1"),
            specimen("2023-AA-0010", "10", "2023", "LOC2"),
            specimen("2023-AA-0011", "11", "2023", "LOC2"),
            specimen("2022-AA-0020", "20", "2022", "LOC2"),
        ]
    }

    fn related() -> RelatedKeys {
        let mut keys = RelatedKeys::new();
        keys.insert(EntityKind::Locality, vec!["LOC1".into(), "LOC2".into()]);
        keys
    }

    fn numbers(p: &Predicate) -> Vec<String> {
        let related = related();
        fixtures()
            .iter()
            .filter(|r| p.matches(r, &related))
            .map(|r| r.get("specimenNumber").unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn single_value_is_case_insensitive_exact() {
        let p = FilterBuilder::parse_filter("year", "2023", false);
        assert_eq!(numbers(&p), vec!["1", "2", "3", "10", "11"]);
    }

    #[test]
    fn numeric_range_enumerates() {
        let p = FilterBuilder::parse_filter("specimenNumber", "1:3", true);
        assert_eq!(numbers(&p), vec!["1", "2", "3"]);
    }

    #[test]
    fn comma_list_is_union() {
        let p = FilterBuilder::parse_filter("specimenNumber", "1, 10, 20", false);
        assert_eq!(numbers(&p), vec!["1", "10", "20"]);

        let p = FilterBuilder::parse_filter("specimenNumber", "1:3, 20", true);
        assert_eq!(numbers(&p), vec!["1", "2", "3", "20"]);
    }

    #[test]
    fn colon_without_range_support_is_literal() {
        let p = FilterBuilder::parse_filter("specimenNumber", "1:3", false);
        assert!(matches!(p, Predicate::IExact { .. }));
    }

    #[test]
    fn catalog_range_uses_padded_bounds() {
        let p = FilterBuilder::parse_filter("catalogNumber", "2023-AA-2:10", true);
        assert_eq!(numbers(&p), vec!["2", "3", "10"]);

        let Predicate::And(parts) = &p else {
            panic!("expected conjunction, got {p:?}");
        };
        assert!(parts.contains(&Predicate::Gte {
            field: "catalogNumber".into(),
            value: "2023-AA-02".into()
        }));
    }

    #[test]
    fn malformed_range_falls_back_to_contains() {
        let p = FilterBuilder::parse_filter("year", "2020:2021:2022", true);
        assert_eq!(
            p,
            Predicate::IContains {
                field: "year".into(),
                value: "2020:2021:2022".into()
            }
        );
    }

    #[test]
    fn non_numeric_bounds_compare_as_text() {
        let p = FilterBuilder::parse_filter("year", "20a:20b", true);
        assert!(matches!(p, Predicate::And(_)));
    }

    #[test]
    fn reversed_range_matches_nothing() {
        let p = FilterBuilder::parse_filter("specimenNumber", "5:1", true);
        assert!(numbers(&p).is_empty());
    }

    #[test]
    fn wide_range_uses_numeric_cast() {
        let p = FilterBuilder::parse_filter("specimenNumber", "1:1000000", true);
        assert!(matches!(p, Predicate::NumericBetween { .. }));
        assert_eq!(numbers(&p).len(), 6);
    }

    #[test]
    fn extracts_years() {
        let years = FilterBuilder::extract_year_values("2022, 2023:2025");
        assert_eq!(years, vec!["2022", "2023", "2024", "2025"]);

        let years = FilterBuilder::extract_year_values("abc:def, 2020");
        assert_eq!(years, vec!["abc:def", "2020"]);
    }

    #[test]
    fn catalog_by_year_prefix() {
        let p = FilterBuilder::catalog_number_by_year("2022");
        assert_eq!(numbers(&p), vec!["20"]);
    }

    #[test]
    fn model_filters_combine_special_and_generic() {
        let mut params = BTreeMap::new();
        params.insert("specimenNumber".to_owned(), "1:3".to_owned());
        let p = apply_model_filters(&SPECIMEN, &params);
        assert_eq!(numbers(&p), vec!["1", "2", "3"]);

        params.insert("locality".to_owned(), "loc2".to_owned());
        let p = apply_model_filters(&SPECIMEN, &params);
        assert!(numbers(&p).is_empty());
    }

    #[test]
    fn year_filter_also_constrains_catalog_prefix() {
        let mut params = BTreeMap::new();
        params.insert("year".to_owned(), "2022:2023".to_owned());
        let p = apply_model_filters(&SPECIMEN, &params);
        assert_eq!(p.fields(), vec!["year", "catalogNumber", "catalogNumber"]);
    }

    #[test]
    fn foreign_key_falls_back_to_substring_then_nothing() {
        let mut keys = RelatedKeys::new();
        keys.insert(EntityKind::Initials, vec!["ABC".into(), "XY".into()]);
        let record: Record = [("recordedBy", "ABC")].into_iter().collect();

        let exact = Predicate::Related {
            field: "recordedBy".into(),
            target: EntityKind::Initials,
            value: "ABC".into(),
        };
        assert!(exact.matches(&record, &keys));

        let partial = Predicate::Related {
            field: "recordedBy".into(),
            target: EntityKind::Initials,
            value: "b".into(),
        };
        assert!(partial.matches(&record, &keys));

        let missing = Predicate::Related {
            field: "recordedBy".into(),
            target: EntityKind::Initials,
            value: "QQ".into(),
        };
        assert!(!missing.matches(&record, &keys));
    }

    #[test]
    fn numeric_ordering_of_text_numbers() {
        let mut records = fixtures();
        records.reverse();
        records.sort_by(|a, b| compare_records(a, b, &[SortKey::NumericText("specimenNumber")]));
        let order: Vec<_> = records
            .iter()
            .map(|r| r.get("specimenNumber").unwrap_or_default())
            .collect();
        assert_eq!(order, vec!["1", "2", "3", "10", "11", "20"]);
    }

    #[test]
    fn zero_fill_matches_python() {
        assert_eq!(zero_fill("7", 4), "0007");
        assert_eq!(zero_fill("0200", 4), "0200");
        assert_eq!(zero_fill("-5", 3), "-05");
    }

    #[test]
    fn hints_flag_special_fields() {
        let hints = filter_hints(&SPECIMEN);
        let year = hints.iter().find(|h| h.field == "year").unwrap();
        assert!(year.special && year.range_support);
        let locality = hints.iter().find(|h| h.field == "locality").unwrap();
        assert!(locality.special && !locality.range_support);
        let genus = hints.iter().find(|h| h.field == "genus").unwrap();
        assert_eq!(genus.placeholder, "Filter by genus");
    }
}
