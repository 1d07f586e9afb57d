//! Generic record repository
//!
//! One repository type serves every entity kind; the static schema supplies
//! the table, the columns and their casts.

use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use specdb_core::filter::SortKey;
use specdb_core::{Changes, EntityKind, EntitySchema, Predicate, Record};

use super::DbError;
use crate::db::query::{order_by, push_predicate, push_value, quote_ident, select_list};
use crate::models::{Cursor, KeysetPage, Paginated, Pagination};

/// A persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    pub fields: Record,
}

/// Repository over one entity table.
pub struct RecordRepo<'a> {
    pool: &'a PgPool,
    schema: &'static EntitySchema,
}

impl<'a> RecordRepo<'a> {
    pub fn new(pool: &'a PgPool, kind: EntityKind) -> Self {
        Self {
            pool,
            schema: kind.schema(),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    fn table(&self) -> String {
        quote_ident(self.schema.table)
    }

    fn select_from(&self) -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE ",
            select_list(self.schema),
            self.table()
        ))
    }

    fn from_row(&self, row: &PgRow) -> Result<StoredRecord, DbError> {
        let id: i64 = row.try_get("id")?;
        let mut fields = Record::new();
        for field in self.schema.fields {
            let value: Option<String> = row.try_get(field.name)?;
            fields.set_opt(field.name, value);
        }
        Ok(StoredRecord { id, fields })
    }

    fn not_found(&self, id: impl ToString) -> DbError {
        DbError::NotFound {
            resource: self.schema.label,
            id: id.to_string(),
        }
    }

    /// Keyset page of rows matching `filter`, ordered by the keyset column
    /// (NULLs as blank) and then id.
    pub async fn list_keyset(
        &self,
        filter: &Predicate,
        after: Option<&Cursor>,
        limit: u32,
    ) -> Result<KeysetPage<StoredRecord>, DbError> {
        let mut qb = self.select_from();
        push_predicate(&mut qb, self.schema, filter)?;

        let key_expr = self
            .schema
            .keyset_column
            .map(|col| format!("COALESCE({}, '')", quote_ident(col)));

        if let Some(cursor) = after {
            match &key_expr {
                Some(expr) => {
                    qb.push(format!(" AND ({expr}, id) > ("));
                    qb.push_bind(cursor.key.clone().unwrap_or_default());
                    qb.push(", ");
                    qb.push_bind(cursor.id);
                    qb.push(")");
                }
                None => {
                    qb.push(" AND id > ");
                    qb.push_bind(cursor.id);
                }
            }
        }

        match &key_expr {
            Some(expr) => qb.push(format!(" ORDER BY {expr}, id")),
            None => qb.push(" ORDER BY id"),
        };
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64 + 1);

        let rows = qb.build().fetch_all(self.pool).await?;
        let mut items = rows
            .iter()
            .map(|row| self.from_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if items.len() > limit as usize {
            items.truncate(limit as usize);
            items.last().map(|last| {
                Cursor {
                    key: self
                        .schema
                        .keyset_column
                        .map(|col| last.fields.get(col).unwrap_or_default().to_owned()),
                    id: last.id,
                }
                .encode()
            })
        } else {
            None
        };

        Ok(KeysetPage { items, next_cursor })
    }

    /// Offset page of rows matching `filter` in `ordering`.
    pub async fn report(
        &self,
        filter: &Predicate,
        ordering: &[SortKey],
        page: Pagination,
    ) -> Result<Paginated<StoredRecord>, DbError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {}, COUNT(*) OVER() AS __total FROM {} WHERE ",
            select_list(self.schema),
            self.table()
        ));
        push_predicate(&mut qb, self.schema, filter)?;
        qb.push(format!(" ORDER BY {}", order_by(self.schema, ordering)?));
        qb.push(" LIMIT ");
        qb.push_bind(page.limit() as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(self.pool).await?;
        let total = match rows.first() {
            Some(row) => row.try_get::<i64, _>("__total")?,
            None => self.count(filter).await?,
        };
        let items = rows
            .iter()
            .map(|row| self.from_row(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Paginated {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// Number of rows matching `filter`.
    pub async fn count(&self, filter: &Predicate) -> Result<i64, DbError> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {} WHERE ", self.table()));
        push_predicate(&mut qb, self.schema, filter)?;
        let total: i64 = qb.build_query_scalar().fetch_one(self.pool).await?;
        Ok(total)
    }

    /// Every row matching `filter`, for exports.
    pub async fn all(&self, filter: &Predicate, ordering: &[SortKey]) -> Result<Vec<StoredRecord>, DbError> {
        let mut qb = self.select_from();
        push_predicate(&mut qb, self.schema, filter)?;
        qb.push(format!(" ORDER BY {}", order_by(self.schema, ordering)?));

        let rows = qb.build().fetch_all(self.pool).await?;
        rows.iter().map(|row| self.from_row(row)).collect()
    }

    pub async fn get(&self, id: i64) -> Result<StoredRecord, DbError> {
        let mut qb = self.select_from();
        qb.push("id = ");
        qb.push_bind(id);

        let row = qb
            .build()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        self.from_row(&row)
    }

    /// Look a row up by its natural key.
    pub async fn find_by_key(&self, key: &str) -> Result<Option<StoredRecord>, DbError> {
        let Some(column) = self.schema.natural_key else {
            return Ok(None);
        };
        let mut qb = self.select_from();
        qb.push(format!("{} = ", quote_ident(column)));
        qb.push_bind(key.to_owned());

        match qb.build().fetch_optional(self.pool).await? {
            Some(row) => Ok(Some(self.from_row(&row)?)),
            None => Ok(None),
        }
    }

    fn writable(&self, name: &str) -> bool {
        !(self.schema.timestamps && matches!(name, "created_at" | "updated_at"))
    }

    /// Insert `record`; fields outside the schema are ignored.
    pub async fn insert(&self, record: &Record) -> Result<StoredRecord, DbError> {
        let fields: Vec<_> = self
            .schema
            .fields
            .iter()
            .filter(|f| self.writable(f.name))
            .filter_map(|f| record.get(f.name).map(|v| (f, v.to_owned())))
            .collect();

        let mut qb = QueryBuilder::new(format!("INSERT INTO {} ", self.table()));
        if fields.is_empty() {
            qb.push("DEFAULT VALUES");
        } else {
            let columns: Vec<String> = fields.iter().map(|(f, _)| quote_ident(f.name)).collect();
            qb.push(format!("({}) VALUES (", columns.join(", ")));
            for (i, (field, value)) in fields.into_iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, field, Some(value));
            }
            qb.push(")");
        }
        qb.push(format!(" RETURNING {}", select_list(self.schema)));

        let row = qb.build().fetch_one(self.pool).await?;
        let stored = self.from_row(&row)?;
        tracing::debug!(table = self.schema.table, id = stored.id, "inserted record");
        Ok(stored)
    }

    /// Apply `changes` to row `id`. No changes is a plain read.
    pub async fn update(&self, id: i64, changes: &Changes) -> Result<StoredRecord, DbError> {
        let mut assignments = Vec::new();
        for (name, value) in changes {
            let field = self.schema.field(name).ok_or_else(|| DbError::UnknownField {
                table: self.schema.table,
                field: (*name).to_owned(),
            })?;
            if self.writable(field.name) {
                assignments.push((field, value.clone()));
            }
        }
        if assignments.is_empty() {
            return self.get(id).await;
        }

        let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", self.table()));
        for (i, (field, value)) in assignments.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(format!("{} = ", quote_ident(field.name)));
            push_value(&mut qb, field, value);
        }
        if self.schema.timestamps {
            qb.push(", updated_at = NOW()");
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {}", select_list(self.schema)));

        let row = qb
            .build()
            .fetch_optional(self.pool)
            .await?
            .ok_or_else(|| self.not_found(id))?;
        self.from_row(&row)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table()))
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.not_found(id));
        }
        Ok(())
    }

    /// Remove every row. Returns the number deleted.
    pub async fn delete_all(&self) -> Result<u64, DbError> {
        let result = sqlx::query(&format!("DELETE FROM {}", self.table()))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Non-null values of `field`.
    pub async fn column_values(&self, field: &str) -> Result<Vec<String>, DbError> {
        let descriptor = self.schema.field(field).ok_or_else(|| DbError::UnknownField {
            table: self.schema.table,
            field: field.to_owned(),
        })?;
        let col = crate::db::query::text_expr(descriptor);
        let sql = format!(
            "SELECT {col} FROM {} WHERE {col} IS NOT NULL ORDER BY 1",
            self.table()
        );
        let values: Vec<String> = sqlx::query_scalar(&sql).fetch_all(self.pool).await?;
        Ok(values)
    }

    /// Every natural key in the table. Empty for kinds without one.
    pub async fn natural_keys(&self) -> Result<Vec<String>, DbError> {
        match self.schema.natural_key {
            Some(key) => self.column_values(key).await,
            None => Ok(Vec::new()),
        }
    }
}
