//! Sibling ordering for the course hierarchy.
//!
//! Every collection of ordered children (chapters of a course, lessons of a
//! chapter, content blocks of a lesson, exercises of a lesson or chapter) keeps
//! a 1-based `order` column that should be dense per parent. One generic
//! manager parameterized by a [`SiblingCollection`] descriptor owns that column:
//! append-on-create, whole-list reorder in a single transaction, delete without
//! compaction, plus explicit compaction and density reporting.
//!
//! Operations are synchronous and generic over [`crate::db::CourseDb`]. Async
//! callers run them inside `tokio::task::spawn_blocking`.

mod ops;
mod types;

pub use ops::{
    compact_siblings, create_sibling, delete_sibling, density_report, list_positions,
    list_siblings, next_position, reorder_siblings, reorder_siblings_strict, update_sibling,
    validate_permutation,
};
pub(crate) use ops::reject_nul_text;
pub use types::{
    DensityReport, OrderingError, ReorderOutcome, SiblingCollection, SiblingPosition,
    UpdateOutcome, CHAPTERS, CHAPTER_EXERCISES, LESSONS, LESSON_CONTENTS, LESSON_EXERCISES,
    MAX_ORDER,
};
