//! Read model of one course: the nested outline built from a single snapshot,
//! plus the per-session view state used to render it.

mod tree;
mod view_state;

pub use tree::{
    assemble_course_hierarchy, load_course_snapshot, load_course_snapshot_async_pg,
    retrieve_course_hierarchy, retrieve_course_hierarchy_async_pg, ChapterNode, CourseHierarchy,
    CourseSnapshot, HierarchyError, LessonNode, OrderAnomaly,
};
pub use view_state::{HierarchyViewState, NodeKey, OutlineKind, OutlineRow};
