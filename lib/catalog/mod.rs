//! Course content records and their CRUD operations.
//!
//! Every ordered entity (chapters, lessons, contents, exercises) is created,
//! edited, deleted and reordered through [`crate::ordering`]; this module only
//! contributes the payload columns and typed rows.

mod ops;
mod types;

pub use ops::{
    create_chapter, create_content, create_course, create_exercise, create_lesson,
    create_test_case, delete_chapter, delete_content, delete_course, delete_exercise,
    delete_lesson, delete_test_case, get_chapter, get_content, get_course, get_exercise,
    get_lesson, list_chapters, list_contents, list_courses, list_exercises, list_lessons,
    list_test_cases, reorder_children, reorder_exercises, update_chapter, update_content,
    update_course, update_exercise, update_lesson, update_test_case,
};
pub use types::{
    Chapter, ChapterPatch, CodingExercise, ContentPatch, ContentType, Course, CourseLevel,
    CoursePatch, ExerciseDifficulty, ExerciseParent, ExercisePatch, Lesson, LessonContent,
    LessonPatch, NewChapter, NewContent, NewCourse, NewExercise, NewLesson, NewTestCase,
    TestCase, TestCasePatch,
};
