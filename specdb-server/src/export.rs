//! Table exports
//!
//! The specimen report export inlines the referenced locality and people so
//! a spreadsheet stands on its own. Extra columns are ignored on import, so
//! an export can be loaded back unchanged. Raw exports carry every column of
//! one table and back the spreadsheet backups.

use std::collections::HashMap;

use sqlx::PgPool;

use specdb_core::filter::report_ordering;
use specdb_core::{EntityKind, FieldKind, Predicate, Record, Table};

use crate::db::{DbError, RecordRepo};

/// Locality columns copied into the specimen report, prefixed `locality_`.
const LOCALITY_COLUMNS: [&str; 6] = ["country", "region", "province", "district", "siteName", "habitat"];

/// Specimen report rows with locality details and people's names inlined.
pub fn flatten_specimens(
    specimens: &[Record],
    localities: &HashMap<String, Record>,
    people: &HashMap<String, Record>,
) -> Table {
    let schema = EntityKind::Specimen.schema();
    let mut headers = Vec::new();
    for field in schema.fields {
        headers.push(field.name.to_owned());
        match field.kind {
            FieldKind::ForeignKey(EntityKind::Locality) => {
                headers.extend(LOCALITY_COLUMNS.iter().map(|c| format!("locality_{c}")));
            }
            FieldKind::ForeignKey(EntityKind::Initials) => headers.push(format!("{}_name", field.name)),
            _ => {}
        }
    }

    let mut table = Table::new(headers);
    for specimen in specimens {
        let mut row = Vec::with_capacity(table.headers.len());
        for field in schema.fields {
            let value = specimen.get(field.name);
            row.push(value.unwrap_or_default().to_owned());
            match field.kind {
                FieldKind::ForeignKey(EntityKind::Locality) => {
                    let locality = value.and_then(|code| localities.get(code));
                    for column in LOCALITY_COLUMNS {
                        row.push(
                            locality
                                .and_then(|l| l.get(column))
                                .unwrap_or_default()
                                .to_owned(),
                        );
                    }
                }
                FieldKind::ForeignKey(EntityKind::Initials) => {
                    let name = value
                        .and_then(|initials| people.get(initials))
                        .and_then(|p| p.get("name"));
                    row.push(name.unwrap_or_default().to_owned());
                }
                _ => {}
            }
        }
        table.push_row(row);
    }
    table
}

async fn keyed(pool: &PgPool, kind: EntityKind) -> Result<HashMap<String, Record>, DbError> {
    let repo = RecordRepo::new(pool, kind);
    let key = repo.schema().natural_key.unwrap_or("id");
    let rows = repo.all(&Predicate::All, &[]).await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| Some((r.fields.get(key)?.to_owned(), r.fields)))
        .collect())
}

/// Flattened specimen report for rows matching `filter`, in report order.
pub async fn specimen_report(pool: &PgPool, filter: &Predicate) -> Result<Table, DbError> {
    let specimens: Vec<Record> = RecordRepo::new(pool, EntityKind::Specimen)
        .all(filter, report_ordering(EntityKind::Specimen))
        .await?
        .into_iter()
        .map(|r| r.fields)
        .collect();
    let localities = keyed(pool, EntityKind::Locality).await?;
    let people = keyed(pool, EntityKind::Initials).await?;

    let table = flatten_specimens(&specimens, &localities, &people);
    tracing::info!(rows = table.len(), "exported specimen report");
    Ok(table)
}

/// Every column of one table, `id` first.
pub async fn raw_table(pool: &PgPool, kind: EntityKind) -> Result<Table, DbError> {
    let repo = RecordRepo::new(pool, kind);
    let schema = repo.schema();
    let rows = repo.all(&Predicate::All, &[]).await?;

    let mut headers = vec!["id".to_owned()];
    headers.extend(schema.field_names().map(str::to_owned));
    let mut table = Table::new(headers);
    for stored in rows {
        let mut row = vec![stored.id.to_string()];
        row.extend(
            schema
                .field_names()
                .map(|f| stored.fields.get(f).unwrap_or_default().to_owned()),
        );
        table.push_row(row);
    }
    tracing::info!(kind = %kind, rows = table.len(), "exported table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specdb_core::{ImportSession, ReferenceSets, TabularFormat};

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs.iter().copied().collect()
    }

    #[test]
    fn inlines_locality_and_people() {
        let specimens = vec![
            record(&[
                ("catalogNumber", "2023-KL-0001"),
                ("locality", "KL"),
                ("recordedBy", "AB"),
            ]),
            record(&[("catalogNumber", "2023-XX-0002"), ("locality", "XX")]),
        ];
        let localities: HashMap<String, Record> =
            [("KL".to_owned(), record(&[("localityCode", "KL"), ("country", "Peru")]))]
                .into_iter()
                .collect();
        let people: HashMap<String, Record> =
            [("AB".to_owned(), record(&[("initials", "AB"), ("name", "Ana Bravo")]))]
                .into_iter()
                .collect();

        let table = flatten_specimens(&specimens, &localities, &people);
        assert_eq!(table.cell(0, "locality_country"), Some("Peru"));
        assert_eq!(table.cell(0, "recordedBy_name"), Some("Ana Bravo"));
        assert_eq!(table.cell(0, "identifiedBy_name"), Some(""));
        assert_eq!(table.cell(1, "locality"), Some("XX"));
        assert_eq!(table.cell(1, "locality_country"), Some(""));
    }

    #[test]
    fn report_columns_follow_schema_order() {
        let table = flatten_specimens(&[], &HashMap::new(), &HashMap::new());
        let locality = table.column("locality").unwrap();
        assert_eq!(table.headers[locality + 1], "locality_country");
        assert_eq!(table.headers[0], "modified");
        assert!(table.column("georeferencedBy_name").is_some());
    }

    #[test]
    fn exported_report_imports_back() {
        let specimens: Vec<Record> = (1..=3)
            .map(|n| {
                let catalog = format!("2023-KL-{n:04}");
                let number = n.to_string();
                record(&[
                    ("catalogNumber", catalog.as_str()),
                    ("specimenNumber", number.as_str()),
                    ("year", "2023"),
                    ("locality", "KL"),
                    ("recordedBy", "AB"),
                    ("modified", "01-05-2023, AB, created"),
                ])
            })
            .collect();
        let localities: HashMap<String, Record> =
            [("KL".to_owned(), record(&[("localityCode", "KL"), ("country", "Peru")]))]
                .into_iter()
                .collect();
        let people: HashMap<String, Record> =
            [("AB".to_owned(), record(&[("initials", "AB"), ("name", "Ana Bravo")]))]
                .into_iter()
                .collect();
        let exported = flatten_specimens(&specimens, &localities, &people);

        let mut refs = ReferenceSets::new();
        refs.insert_keys(EntityKind::Locality, ["KL".to_owned()]);
        refs.insert_keys(EntityKind::Initials, ["AB".to_owned()]);

        for format in [TabularFormat::Csv, TabularFormat::Xlsx] {
            let bytes = exported.to_bytes(format, "Specimens").unwrap();
            let table = Table::read(&bytes, format).unwrap();
            let mut session =
                ImportSession::new(EntityKind::Specimen, format!("specimens.{format}"), table).unwrap();
            assert!(session.ignored_columns.iter().any(|c| c == "locality_country"));
            assert!(session.ignored_columns.iter().any(|c| c == "recordedBy_name"));

            session.validate_all(&refs);
            assert!(!session.has_errors(), "{format}: {:?}", session.reports);

            let imported: Vec<Record> = session
                .committable_rows()
                .unwrap()
                .into_iter()
                .map(|(_, r)| r)
                .collect();
            assert_eq!(imported.len(), specimens.len());
            for (back, original) in imported.iter().zip(&specimens) {
                assert_eq!(back.get("catalogNumber"), original.get("catalogNumber"), "{format}");
                assert_eq!(back.get("locality"), Some("KL"));
                assert_eq!(back.get("modified"), Some("01-05-2023, AB, created"));
                assert!(!back.contains("locality_country"));
            }
        }
    }
}
