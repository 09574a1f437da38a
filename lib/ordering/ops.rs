use std::collections::HashSet;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{BigInt, Nullable};
use diesel::QueryableByName;
use log::{debug, info, warn};

use super::types::{
    DensityReport, OrderingError, ReorderOutcome, SiblingCollection, SiblingPosition,
    UpdateOutcome, MAX_ORDER,
};
use crate::db::sql::{
    count_by_id, delete_by_id, first_nul_column, insert_returning_id, update_by_id, ColumnValue,
};
use crate::db::store::{count, insert_returning};
use crate::db::{CourseDb, DbRow};

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
struct PositionRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    parent_id: i64,
    #[diesel(sql_type = BigInt)]
    position: i64,
}

#[derive(Debug, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
struct MaxPositionRow {
    #[diesel(sql_type = Nullable<BigInt>)]
    position: Option<i64>,
}

/// Loads every child of `parent_id` as `R`, ascending by order.
///
/// Ties (only possible after a side-door order edit or a partial reorder) fall
/// back to id order so the output stays deterministic.
pub fn list_siblings<C, R>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
) -> Result<Vec<R>, OrderingError>
where
    C: CourseDb,
    R: DbRow,
{
    let sql = format!(
        "SELECT * FROM {table} WHERE {parent} = {parent_id} ORDER BY {order} ASC, {id} ASC",
        table = collection.table,
        parent = collection.parent_column,
        order = collection.order_column,
        id = collection.id_column,
    );
    Ok(conn.load_rows::<R>(&sql)?)
}

/// Same ordering as [`list_siblings`], projected to `(id, parent_id, order)`.
pub fn list_positions<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
) -> Result<Vec<SiblingPosition>, OrderingError>
where
    C: CourseDb,
{
    let sql = format!(
        "SELECT {id} AS id, {parent} AS parent_id, {order} AS position \
         FROM {table} WHERE {parent} = {parent_id} ORDER BY {order} ASC, {id} ASC",
        table = collection.table,
        parent = collection.parent_column,
        order = collection.order_column,
        id = collection.id_column,
    );

    Ok(conn
        .load_rows::<PositionRow>(&sql)?
        .into_iter()
        .map(|row| SiblingPosition {
            id: row.id,
            parent_id: row.parent_id,
            order: row.position,
        })
        .collect())
}

/// `max(order) + 1` among the children of `parent_id`, or `1` when there are none.
///
/// Fails with [`OrderingError::InvalidInput`] once the last sibling sits at
/// [`MAX_ORDER`].
pub fn next_position<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
) -> Result<i64, OrderingError>
where
    C: CourseDb,
{
    let sql = format!(
        "SELECT MAX({order}) AS position FROM {table} WHERE {parent} = {parent_id}",
        table = collection.table,
        parent = collection.parent_column,
        order = collection.order_column,
    );

    let current_max = conn
        .load_rows::<MaxPositionRow>(&sql)?
        .pop()
        .and_then(|row| row.position)
        .unwrap_or(0);

    current_max
        .checked_add(1)
        .filter(|next| *next <= MAX_ORDER)
        .ok_or_else(|| {
            OrderingError::InvalidInput(format!(
                "{}_order space exhausted under {} {parent_id}",
                collection.entity, collection.parent_entity
            ))
        })
}

/// Inserts one child under `parent_id` and returns its generated id.
///
/// Without `explicit_order` the child is appended after its current last
/// sibling. An explicit order is stored as given; avoiding collisions is then
/// the caller's job. The max lookup and the insert are separate statements, so
/// two concurrent appends to the same parent can pick the same value.
pub fn create_sibling<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    payload: Vec<(&'static str, ColumnValue)>,
    explicit_order: Option<i64>,
) -> Result<i64, OrderingError>
where
    C: CourseDb,
{
    if let Some(order) = explicit_order {
        check_explicit_order(collection, order)?;
    }
    reject_structural_columns(collection, &payload)?;
    reject_nul_text(&payload)?;

    let parent_sql = count_by_id(
        collection.parent_table,
        collection.parent_id_column,
        parent_id,
    );
    if count(conn, &parent_sql)? == 0 {
        return Err(parent_missing(collection, parent_id));
    }

    let order = match explicit_order {
        Some(order) => order,
        None => next_position(conn, collection, parent_id)?,
    };

    let mut columns = Vec::with_capacity(payload.len() + 2);
    columns.push((collection.parent_column, ColumnValue::Int(parent_id)));
    columns.extend(payload);
    columns.push((collection.order_column, ColumnValue::Int(order)));

    let sql = insert_returning_id(collection.table, collection.id_column, &columns);
    let id = insert_returning(conn, &sql).map_err(|err| match err {
        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
            parent_missing(collection, parent_id)
        }
        other => OrderingError::Database(other),
    })?;

    debug!(
        "created {} {id} under {} {parent_id} at order {order}",
        collection.entity, collection.parent_entity
    );
    Ok(id)
}

/// Rewrites the order of the listed children to `1..=ids.len()` in one transaction.
///
/// Each update is scoped by child id and parent id, so ids owned by another
/// parent are skipped rather than renumbered. The list is not required to be a
/// complete permutation: unlisted siblings keep their previous values and are
/// reported in [`ReorderOutcome::unlisted`]. Any statement failure rolls back
/// every update and surfaces as [`OrderingError::TransactionFailure`].
pub fn reorder_siblings<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    ordered_ids: &[i64],
) -> Result<ReorderOutcome, OrderingError>
where
    C: CourseDb,
{
    run_reorder(conn, collection, parent_id, ReorderInput::Lenient(ordered_ids))
}

/// Like [`reorder_siblings`], but rejects anything other than an exact
/// permutation of the current children before writing.
pub fn reorder_siblings_strict<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    ordered_ids: &[i64],
) -> Result<ReorderOutcome, OrderingError>
where
    C: CourseDb,
{
    run_reorder(conn, collection, parent_id, ReorderInput::Strict(ordered_ids))
}

/// Renumbers the children of `parent_id` to `1..=N`, keeping their current
/// display order. Closes gaps left by deletes; never runs implicitly.
pub fn compact_siblings<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
) -> Result<ReorderOutcome, OrderingError>
where
    C: CourseDb,
{
    run_reorder(conn, collection, parent_id, ReorderInput::Current)
}

/// Checks that `ordered_ids` lists every current child of `parent_id` exactly once.
pub fn validate_permutation<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    ordered_ids: &[i64],
) -> Result<(), OrderingError>
where
    C: CourseDb,
{
    let current = list_positions(conn, collection, parent_id)?;
    check_permutation(collection, parent_id, &current, ordered_ids)
}

/// Applies a partial update to one child.
///
/// An empty patch without an order is a no-op reported as
/// [`UpdateOutcome::NothingToUpdate`]. An explicit `order` is written as a
/// plain single-row update: it is not coordinated with the siblings and may
/// break density until the next reorder.
pub fn update_sibling<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    item_id: i64,
    patch: Vec<(&'static str, ColumnValue)>,
    order: Option<i64>,
) -> Result<UpdateOutcome, OrderingError>
where
    C: CourseDb,
{
    if let Some(order) = order {
        check_explicit_order(collection, order)?;
    }
    reject_structural_columns(collection, &patch)?;
    reject_nul_text(&patch)?;

    let mut columns = patch;
    if let Some(order) = order {
        columns.push((collection.order_column, ColumnValue::Int(order)));
    }

    let Some(sql) = update_by_id(collection.table, collection.id_column, item_id, &columns) else {
        return Ok(UpdateOutcome::NothingToUpdate);
    };

    if conn.execute_sql(&sql)? == 0 {
        return Err(OrderingError::NotFound {
            entity: collection.entity,
            id: item_id,
        });
    }

    if order.is_some() {
        debug!(
            "{} {item_id} order edited outside the reorder protocol",
            collection.entity
        );
    }
    Ok(UpdateOutcome::Updated)
}

/// Deletes one child. Remaining siblings keep their order values, leaving a gap.
pub fn delete_sibling<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    item_id: i64,
) -> Result<(), OrderingError>
where
    C: CourseDb,
{
    let sql = delete_by_id(collection.table, collection.id_column, item_id);
    if conn.execute_sql(&sql)? == 0 {
        return Err(OrderingError::NotFound {
            entity: collection.entity,
            id: item_id,
        });
    }
    Ok(())
}

/// Describes how far the children of `parent_id` are from a dense `1..=N`.
pub fn density_report<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
) -> Result<DensityReport, OrderingError>
where
    C: CourseDb,
{
    let orders = list_positions(conn, collection, parent_id)?
        .into_iter()
        .map(|position| position.order)
        .collect::<Vec<_>>();
    Ok(DensityReport::from_orders(&orders))
}

enum ReorderInput<'a> {
    Lenient(&'a [i64]),
    Strict(&'a [i64]),
    /// Use the current display order.
    Current,
}

fn run_reorder<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    input: ReorderInput<'_>,
) -> Result<ReorderOutcome, OrderingError>
where
    C: CourseDb,
{
    let result: Result<ReorderOutcome, OrderingError> = conn.in_transaction(|conn| {
        let current = list_positions(conn, collection, parent_id)?;
        let current_ids;
        let ordered_ids = match input {
            ReorderInput::Lenient(ids) => ids,
            ReorderInput::Strict(ids) => {
                check_permutation(collection, parent_id, &current, ids)?;
                ids
            }
            ReorderInput::Current => {
                current_ids = current.iter().map(|position| position.id).collect::<Vec<_>>();
                current_ids.as_slice()
            }
        };

        let mut outcome = ReorderOutcome::default();
        for (index, id) in ordered_ids.iter().enumerate() {
            let position = i64::try_from(index + 1).map_err(|_| {
                OrderingError::InvalidInput("reorder list is too long".to_string())
            })?;
            let sql = format!(
                "UPDATE {table} SET {order} = {position} WHERE {id_column} = {id} AND {parent} = {parent_id}",
                table = collection.table,
                order = collection.order_column,
                id_column = collection.id_column,
                parent = collection.parent_column,
            );
            if conn.execute_sql(&sql)? == 0 {
                outcome.skipped.push(*id);
            } else {
                outcome.updated += 1;
            }
        }

        let listed = ordered_ids.iter().copied().collect::<HashSet<_>>();
        outcome.unlisted = current
            .iter()
            .map(|position| position.id)
            .filter(|id| !listed.contains(id))
            .collect();

        Ok(outcome)
    });

    let outcome = result.map_err(|err| match err {
        OrderingError::Database(source) => {
            warn!(
                "reorder of {}s under {} {parent_id} rolled back: {source}",
                collection.entity, collection.parent_entity
            );
            OrderingError::TransactionFailure {
                entity: collection.entity,
                parent_entity: collection.parent_entity,
                parent_id,
                source,
            }
        }
        other => other,
    })?;

    if !outcome.skipped.is_empty() {
        warn!(
            "reorder under {} {parent_id} skipped {} ids not owned by it: {:?}",
            collection.parent_entity,
            outcome.skipped.len(),
            outcome.skipped
        );
    }
    if !outcome.unlisted.is_empty() {
        warn!(
            "reorder under {} {parent_id} left {} {}s unlisted with stale order values: {:?}",
            collection.parent_entity,
            outcome.unlisted.len(),
            collection.entity,
            outcome.unlisted
        );
    }
    info!(
        "reordered {} {}s under {} {parent_id}",
        outcome.updated, collection.entity, collection.parent_entity
    );

    Ok(outcome)
}

fn check_permutation(
    collection: &SiblingCollection,
    parent_id: i64,
    current: &[SiblingPosition],
    ordered_ids: &[i64],
) -> Result<(), OrderingError> {
    let owned = current
        .iter()
        .map(|position| position.id)
        .collect::<HashSet<_>>();

    let mut seen = HashSet::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        if !seen.insert(*id) {
            return Err(OrderingError::InvalidInput(format!(
                "{} {id} is listed more than once",
                collection.entity
            )));
        }
        if !owned.contains(id) {
            return Err(OrderingError::InvalidInput(format!(
                "{} {id} does not belong to {} {parent_id}",
                collection.entity, collection.parent_entity
            )));
        }
    }

    let mut missing = owned.difference(&seen).copied().collect::<Vec<_>>();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(OrderingError::InvalidInput(format!(
            "reorder of {} {parent_id} omits {}s {missing:?}",
            collection.parent_entity, collection.entity
        )));
    }

    Ok(())
}

fn check_explicit_order(collection: &SiblingCollection, order: i64) -> Result<(), OrderingError> {
    if order <= 0 || order > MAX_ORDER {
        return Err(OrderingError::InvalidInput(format!(
            "{}_order must be between 1 and {MAX_ORDER}, got {order}",
            collection.entity
        )));
    }
    Ok(())
}

/// Text containing NUL cannot be stored; surfaces as bad input.
pub(crate) fn reject_nul_text(
    columns: &[(&'static str, ColumnValue)],
) -> Result<(), OrderingError> {
    match first_nul_column(columns) {
        Some(name) => Err(OrderingError::InvalidInput(format!(
            "{name} must not contain NUL bytes"
        ))),
        None => Ok(()),
    }
}

fn reject_structural_columns(
    collection: &SiblingCollection,
    columns: &[(&'static str, ColumnValue)],
) -> Result<(), OrderingError> {
    for (name, _) in columns {
        if *name == collection.parent_column
            || *name == collection.order_column
            || *name == collection.id_column
        {
            return Err(OrderingError::InvalidInput(format!(
                "column {name} of {}s is managed by the ordering layer",
                collection.entity
            )));
        }
    }
    Ok(())
}

fn parent_missing(collection: &SiblingCollection, parent_id: i64) -> OrderingError {
    OrderingError::ParentMissing {
        parent: collection.parent_entity,
        parent_id,
    }
}
