//! Atomic per-scope counters behind order numbers and product codes.
//!
//! Callers run [`next_value`] inside the transaction that inserts the
//! numbered row, so a rolled back insert also rolls back the counter.

use crate::entities::document_sequence::{self, Entity as DocumentSequence};
use crate::errors::ServiceError;
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    QueryFilter,
};
use std::future::Future;
use tracing::warn;

/// Attempts made to allocate a free number before giving up with a conflict.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 3;

pub fn order_scope(supplier_id: i32, year: i32) -> String {
    format!("order:{}:{}", supplier_id, year)
}

pub fn product_scope(supplier_id: i32) -> String {
    format!("product:{}", supplier_id)
}

/// Increments and returns the counter for `scope`.
///
/// The first use of a scope seeds the counter with the value `seed` resolves
/// to, usually the number of rows already numbered in that scope.
pub async fn next_value<C, F>(conn: &C, scope: &str, seed: F) -> Result<i32, DbErr>
where
    C: ConnectionTrait,
    F: Future<Output = Result<i32, DbErr>>,
{
    let existing = DocumentSequence::find_by_id(scope.to_string())
        .one(conn)
        .await?;

    if existing.is_none() {
        let start = seed.await?;
        DocumentSequence::insert(document_sequence::ActiveModel {
            scope: Set(scope.to_string()),
            last_value: Set(start),
        })
        .exec_without_returning(conn)
        .await?;
    }

    DocumentSequence::update_many()
        .col_expr(
            document_sequence::Column::LastValue,
            Expr::col(document_sequence::Column::LastValue).add(1),
        )
        .filter(document_sequence::Column::Scope.eq(scope))
        .exec(conn)
        .await?;

    DocumentSequence::find_by_id(scope.to_string())
        .one(conn)
        .await?
        .map(|row| row.last_value)
        .ok_or_else(|| DbErr::RecordNotFound(format!("sequence {}", scope)))
}

/// Runs `attempt` again when it fails on a unique index, up to
/// [`MAX_ALLOCATION_ATTEMPTS`] times, then reports a conflict.
pub async fn retry_on_conflict<T, F, Fut>(what: &str, mut attempt: F) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(e) if e.is_unique_violation() && tries < MAX_ALLOCATION_ATTEMPTS => {
                warn!(error = %e, attempt = tries, "{} collided, retrying", what);
            }
            Err(e) if e.is_unique_violation() => {
                return Err(ServiceError::Conflict(format!(
                    "Could not allocate a unique {} after {} attempts",
                    what, MAX_ALLOCATION_ATTEMPTS
                )));
            }
            other => return other,
        }
    }
}
