use std::collections::BTreeMap;

use diesel::result::Error as DieselError;
use serde::Serialize;
use thiserror::Error;

/// Error type shared by ordering and catalog operations.
#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{parent} {parent_id} not found")]
    ParentMissing { parent: &'static str, parent_id: i64 },
    /// The reorder transaction was rolled back; no order value changed.
    #[error("reorder failed for {entity}s of {parent_entity} {parent_id}: {source}")]
    TransactionFailure {
        entity: &'static str,
        parent_entity: &'static str,
        parent_id: i64,
        #[source]
        source: DieselError,
    },
    #[error("database operation failed: {0}")]
    Database(#[from] DieselError),
}

/// Largest order value accepted on create, update or append.
pub const MAX_ORDER: i64 = i32::MAX as i64;

/// Table layout of one parent/child pairing whose children carry a sibling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingCollection {
    pub entity: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub parent_column: &'static str,
    pub order_column: &'static str,
    pub parent_entity: &'static str,
    pub parent_table: &'static str,
    pub parent_id_column: &'static str,
}

pub const CHAPTERS: SiblingCollection = SiblingCollection {
    entity: "chapter",
    table: "chapters",
    id_column: "chapter_id",
    parent_column: "course_id",
    order_column: "chapter_order",
    parent_entity: "course",
    parent_table: "courses",
    parent_id_column: "course_id",
};

pub const LESSONS: SiblingCollection = SiblingCollection {
    entity: "lesson",
    table: "lessons",
    id_column: "lesson_id",
    parent_column: "chapter_id",
    order_column: "lesson_order",
    parent_entity: "chapter",
    parent_table: "chapters",
    parent_id_column: "chapter_id",
};

pub const LESSON_CONTENTS: SiblingCollection = SiblingCollection {
    entity: "content",
    table: "lesson_contents",
    id_column: "content_id",
    parent_column: "lesson_id",
    order_column: "content_order",
    parent_entity: "lesson",
    parent_table: "lessons",
    parent_id_column: "lesson_id",
};

/// Exercises attached directly to a lesson.
pub const LESSON_EXERCISES: SiblingCollection = SiblingCollection {
    entity: "exercise",
    table: "coding_exercises",
    id_column: "exercise_id",
    parent_column: "lesson_id",
    order_column: "exercise_order",
    parent_entity: "lesson",
    parent_table: "lessons",
    parent_id_column: "lesson_id",
};

/// Exercises attached to a chapter as a whole.
pub const CHAPTER_EXERCISES: SiblingCollection = SiblingCollection {
    entity: "exercise",
    table: "coding_exercises",
    id_column: "exercise_id",
    parent_column: "chapter_id",
    order_column: "exercise_order",
    parent_entity: "chapter",
    parent_table: "chapters",
    parent_id_column: "chapter_id",
};

/// The ordering-relevant projection of one child row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SiblingPosition {
    pub id: i64,
    pub parent_id: i64,
    pub order: i64,
}

/// What a reorder call actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorderOutcome {
    /// Positional updates that matched a row owned by the parent.
    pub updated: usize,
    /// Requested ids that are not children of the parent. Left untouched.
    pub skipped: Vec<i64>,
    /// Current children missing from the request. They keep their old order
    /// values, which can collide with the renumbered ones.
    pub unlisted: Vec<i64>,
}

impl ReorderOutcome {
    pub fn is_complete_permutation(&self) -> bool {
        self.skipped.is_empty() && self.unlisted.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated,
    NothingToUpdate,
}

/// Deviation of one parent's order values from the dense `1..=N` range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DensityReport {
    pub count: usize,
    /// Values in `1..=count` that no child holds.
    pub missing: Vec<i64>,
    /// Values held by more than one child.
    pub duplicated: Vec<i64>,
    /// Values outside `1..=count`.
    pub out_of_range: Vec<i64>,
}

impl DensityReport {
    pub fn from_orders(orders: &[i64]) -> Self {
        let count = orders.len();
        let upper = i64::try_from(count).unwrap_or(i64::MAX);

        let mut seen = BTreeMap::<i64, usize>::new();
        for order in orders {
            *seen.entry(*order).or_default() += 1;
        }

        let missing = (1..=upper).filter(|value| !seen.contains_key(value)).collect();
        let duplicated = seen
            .iter()
            .filter(|(_, hits)| **hits > 1)
            .map(|(value, _)| *value)
            .collect();
        let out_of_range = seen
            .keys()
            .copied()
            .filter(|value| *value < 1 || *value > upper)
            .collect();

        Self {
            count,
            missing,
            duplicated,
            out_of_range,
        }
    }

    pub fn is_dense(&self) -> bool {
        self.missing.is_empty() && self.duplicated.is_empty() && self.out_of_range.is_empty()
    }
}
