//! SQL rendering for filter predicates and orderings
//!
//! Column names only ever come from the static entity schema and are quoted;
//! every user-supplied value is bound. Non-text columns are compared through
//! their text form so a predicate means the same thing here as it does when
//! evaluated in memory.

use sqlx::{Postgres, QueryBuilder};

use specdb_core::filter::SortKey;
use specdb_core::{EntitySchema, FieldDescriptor, FieldKind, Predicate};

use super::repos::DbError;

/// Quote an identifier for Postgres.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The text form of a column, as selected and as compared.
pub fn text_expr(field: &FieldDescriptor) -> String {
    let col = quote_ident(field.name);
    match field.kind {
        FieldKind::Timestamp => format!("to_char({col}, 'YYYY-MM-DD HH24:MI:SS')"),
        FieldKind::Date | FieldKind::Time => format!("{col}::text"),
        _ => col,
    }
}

/// `id` plus every schema field as text, aliased to its field name.
pub fn select_list(schema: &EntitySchema) -> String {
    let mut out = String::from("id");
    for field in schema.fields {
        out.push_str(", ");
        out.push_str(&text_expr(field));
        out.push_str(" AS ");
        out.push_str(&quote_ident(field.name));
    }
    out
}

fn lookup(schema: &EntitySchema, name: &str) -> Result<&'static FieldDescriptor, DbError> {
    schema.field(name).ok_or_else(|| DbError::UnknownField {
        table: schema.table,
        field: name.to_owned(),
    })
}

/// Escape `%`, `_` and `\` for LIKE patterns.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Append `predicate` as a boolean SQL expression.
pub fn push_predicate(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &EntitySchema,
    predicate: &Predicate,
) -> Result<(), DbError> {
    match predicate {
        Predicate::All => {
            qb.push("TRUE");
        }
        Predicate::Nothing => {
            qb.push("FALSE");
        }
        Predicate::IExact { field, value } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("LOWER({col}) = LOWER("));
            qb.push_bind(value.clone());
            qb.push(")");
        }
        Predicate::In { field, values } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} = ANY("));
            qb.push_bind(values.clone());
            qb.push(")");
        }
        Predicate::IContains { field, value } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} ILIKE "));
            qb.push_bind(format!("%{}%", escape_like(value)));
        }
        Predicate::Gte { field, value } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} COLLATE \"C\" >= "));
            qb.push_bind(value.clone());
        }
        Predicate::Lte { field, value } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} COLLATE \"C\" <= "));
            qb.push_bind(value.clone());
        }
        Predicate::NumericBetween { field, start, end } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!(
                "(CASE WHEN {col} ~ '^[0-9]+$' THEN {col}::numeric END) BETWEEN "
            ));
            qb.push_bind(*start);
            qb.push(" AND ");
            qb.push_bind(*end);
        }
        Predicate::DigitsAfter { field, prefix } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} ~ "));
            qb.push_bind(format!("^{}[0-9]+$", regex::escape(prefix)));
        }
        Predicate::StartsWith { field, value } => {
            let col = text_expr(lookup(schema, field)?);
            qb.push(format!("{col} LIKE "));
            qb.push_bind(format!("{}%", escape_like(value)));
        }
        Predicate::Related {
            field,
            target,
            value,
        } => {
            let col = text_expr(lookup(schema, field)?);
            let target_schema = target.schema();
            let key = target_schema.natural_key.ok_or_else(|| DbError::UnknownField {
                table: target_schema.table,
                field: "natural key".to_owned(),
            })?;
            let table = quote_ident(target_schema.table);
            let key = quote_ident(key);
            qb.push(format!(
                "(CASE WHEN EXISTS (SELECT 1 FROM {table} WHERE {key} = "
            ));
            qb.push_bind(value.clone());
            qb.push(format!(") THEN {col} = "));
            qb.push_bind(value.clone());
            qb.push(format!(" ELSE {col} IN (SELECT {key} FROM {table} WHERE {key} ILIKE "));
            qb.push_bind(format!("%{}%", escape_like(value)));
            qb.push(") END)");
        }
        Predicate::And(parts) => push_joined(qb, schema, parts, " AND ", "TRUE")?,
        Predicate::Or(parts) => push_joined(qb, schema, parts, " OR ", "FALSE")?,
    }
    Ok(())
}

fn push_joined(
    qb: &mut QueryBuilder<'_, Postgres>,
    schema: &EntitySchema,
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) -> Result<(), DbError> {
    if parts.is_empty() {
        qb.push(empty);
        return Ok(());
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        push_predicate(qb, schema, part)?;
    }
    qb.push(")");
    Ok(())
}

/// `ORDER BY` body for `keys`, always ending with `id` so pages are stable.
pub fn order_by(schema: &EntitySchema, keys: &[SortKey]) -> Result<String, DbError> {
    let mut terms = Vec::with_capacity(keys.len() + 1);
    for key in keys {
        let term = match key {
            SortKey::NumericText(f) => {
                let col = text_expr(lookup(schema, f)?);
                format!("CASE WHEN {col} ~ '^[0-9]+$' THEN {col}::numeric ELSE 0 END")
            }
            SortKey::AscNullsLast(f) => format!("{} ASC NULLS LAST", quote_ident(lookup(schema, f)?.name)),
            SortKey::Asc(f) => format!("{} COLLATE \"C\" ASC", text_expr(lookup(schema, f)?)),
        };
        terms.push(term);
    }
    terms.push("id".to_owned());
    Ok(terms.join(", "))
}

/// Bound value expression for writing `field`, cast to the column type.
pub fn push_value(qb: &mut QueryBuilder<'_, Postgres>, field: &FieldDescriptor, value: Option<String>) {
    qb.push_bind(value);
    qb.push(field.kind.sql_cast());
}

#[cfg(test)]
mod tests {
    use super::*;
    use specdb_core::filter::{apply_model_filters, report_ordering};
    use specdb_core::schema::{BUTTERFLY_COLLECTION, SPECIMEN};
    use specdb_core::EntityKind;
    use std::collections::BTreeMap;

    fn render(schema: &EntitySchema, predicate: &Predicate) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_predicate(&mut qb, schema, predicate).unwrap();
        qb.sql().to_owned()
    }

    #[test]
    fn quotes_mixed_case_columns() {
        assert_eq!(quote_ident("catalogNumber"), "\"catalogNumber\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn renders_range_union() {
        let params: BTreeMap<String, String> =
            [("specimenNumber".to_owned(), "1:3, 20".to_owned())].into_iter().collect();
        let sql = render(&SPECIMEN, &apply_model_filters(&SPECIMEN, &params));
        assert_eq!(sql, "(\"specimenNumber\" = ANY($1) OR LOWER(\"specimenNumber\") = LOWER($2))");
    }

    #[test]
    fn renders_catalog_range() {
        let predicate = specdb_core::FilterBuilder::parse_filter(
            "catalogNumber",
            "2023-KL-0001:0010",
            true,
        );
        let sql = render(&SPECIMEN, &predicate);
        assert!(sql.contains("\"catalogNumber\" ~ $1"), "{sql}");
        assert!(sql.contains("COLLATE \"C\" >= $2"), "{sql}");
        assert!(sql.contains("COLLATE \"C\" <= $3"), "{sql}");
    }

    #[test]
    fn dates_compare_as_text() {
        let predicate = Predicate::IContains {
            field: "eventDate".into(),
            value: "2023".into(),
        };
        assert_eq!(render(&SPECIMEN, &predicate), "\"eventDate\"::text ILIKE $1");
    }

    #[test]
    fn related_filter_targets_natural_key() {
        let predicate = Predicate::Related {
            field: "trap".into(),
            target: EntityKind::Trap,
            value: "T1".into(),
        };
        let sql = render(&BUTTERFLY_COLLECTION, &predicate);
        assert!(sql.contains("FROM \"butterflies_trap\" WHERE \"butterflyID\" = $1"), "{sql}");
        assert!(sql.contains("ILIKE $3"), "{sql}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        let predicate = Predicate::IContains {
            field: "password; DROP TABLE".into(),
            value: "x".into(),
        };
        assert!(matches!(
            push_predicate(&mut qb, &SPECIMEN, &predicate),
            Err(DbError::UnknownField { .. })
        ));
    }

    #[test]
    fn empty_disjunction_is_false() {
        assert_eq!(render(&SPECIMEN, &Predicate::Or(vec![])), "FALSE");
        assert_eq!(render(&SPECIMEN, &Predicate::All), "TRUE");
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }

    #[test]
    fn report_order_is_numeric_then_dates() {
        let sql = order_by(&SPECIMEN, report_ordering(EntityKind::Specimen)).unwrap();
        assert!(sql.starts_with("CASE WHEN \"year\" ~ '^[0-9]+$'"), "{sql}");
        assert!(sql.contains("\"eventDate\" ASC NULLS LAST"), "{sql}");
        assert!(sql.ends_with(", id"), "{sql}");
    }
}
