use log::{debug, info};

use super::types::{
    Chapter, ChapterPatch, CodingExercise, ContentPatch, Course, CoursePatch, ExerciseParent,
    ExercisePatch, Lesson, LessonContent, LessonPatch, NewChapter, NewContent, NewCourse,
    NewExercise, NewLesson, NewTestCase, TestCase, TestCasePatch,
};
use crate::db::sql::{count_by_id, delete_by_id, insert_returning_id, update_by_id};
use crate::db::store::{count, insert_returning};
use crate::db::{CourseDb, DbRow};
use crate::ordering::{
    create_sibling, delete_sibling, list_siblings, reject_nul_text, reorder_siblings,
    reorder_siblings_strict, update_sibling, OrderingError, ReorderOutcome, SiblingCollection, UpdateOutcome, CHAPTERS,
    LESSONS, LESSON_CONTENTS, LESSON_EXERCISES,
};

fn fetch_by_id<C, R>(
    conn: &mut C,
    entity: &'static str,
    table: &str,
    id_column: &str,
    id: i64,
) -> Result<R, OrderingError>
where
    C: CourseDb,
    R: DbRow,
{
    let sql = format!("SELECT * FROM {table} WHERE {id_column} = {id}");
    conn.load_rows::<R>(&sql)?
        .pop()
        .ok_or(OrderingError::NotFound { entity, id })
}

fn require_text(field: &str, value: &str) -> Result<(), OrderingError> {
    if value.trim().is_empty() {
        return Err(OrderingError::InvalidInput(format!("{field} is required")));
    }
    Ok(())
}

/// Reorders the children of `parent_id`, rejecting non-permutations first when `strict`.
pub fn reorder_children<C>(
    conn: &mut C,
    collection: &SiblingCollection,
    parent_id: i64,
    ordered_ids: &[i64],
    strict: bool,
) -> Result<ReorderOutcome, OrderingError>
where
    C: CourseDb,
{
    if strict {
        reorder_siblings_strict(conn, collection, parent_id, ordered_ids)
    } else {
        reorder_siblings(conn, collection, parent_id, ordered_ids)
    }
}

// Courses

/// Active courses only, oldest first.
pub fn list_courses<C: CourseDb>(conn: &mut C) -> Result<Vec<Course>, OrderingError> {
    Ok(conn.load_rows::<Course>(
        "SELECT * FROM courses WHERE is_active = TRUE ORDER BY course_id ASC",
    )?)
}

pub fn get_course<C: CourseDb>(conn: &mut C, course_id: i64) -> Result<Course, OrderingError> {
    fetch_by_id(conn, "course", "courses", "course_id", course_id)
}

pub fn create_course<C: CourseDb>(conn: &mut C, new: &NewCourse) -> Result<Course, OrderingError> {
    require_text("course_name", &new.course_name)?;
    require_text("main_language", &new.main_language)?;

    let columns = new.columns();
    reject_nul_text(&columns)?;
    let sql = insert_returning_id("courses", "course_id", &columns);
    let course_id = insert_returning(conn, &sql)?;
    info!("created course {course_id}");
    get_course(conn, course_id)
}

pub fn update_course<C: CourseDb>(
    conn: &mut C,
    course_id: i64,
    patch: &CoursePatch,
) -> Result<UpdateOutcome, OrderingError> {
    let columns = patch.columns();
    reject_nul_text(&columns)?;
    let Some(sql) = update_by_id("courses", "course_id", course_id, &columns) else {
        return Ok(UpdateOutcome::NothingToUpdate);
    };
    if conn.execute_sql(&sql)? == 0 {
        return Err(OrderingError::NotFound {
            entity: "course",
            id: course_id,
        });
    }
    Ok(UpdateOutcome::Updated)
}

/// Deletes a course and, through cascades, everything beneath it.
pub fn delete_course<C: CourseDb>(conn: &mut C, course_id: i64) -> Result<(), OrderingError> {
    if conn.execute_sql(&delete_by_id("courses", "course_id", course_id))? == 0 {
        return Err(OrderingError::NotFound {
            entity: "course",
            id: course_id,
        });
    }
    info!("deleted course {course_id}");
    Ok(())
}

// Chapters

pub fn list_chapters<C: CourseDb>(
    conn: &mut C,
    course_id: i64,
) -> Result<Vec<Chapter>, OrderingError> {
    list_siblings(conn, &CHAPTERS, course_id)
}

pub fn get_chapter<C: CourseDb>(conn: &mut C, chapter_id: i64) -> Result<Chapter, OrderingError> {
    fetch_by_id(conn, "chapter", "chapters", "chapter_id", chapter_id)
}

pub fn create_chapter<C: CourseDb>(
    conn: &mut C,
    new: &NewChapter,
) -> Result<Chapter, OrderingError> {
    require_text("chapter_name", &new.chapter_name)?;
    let id = create_sibling(
        conn,
        &CHAPTERS,
        new.course_id,
        new.columns(),
        new.chapter_order,
    )?;
    get_chapter(conn, id)
}

pub fn update_chapter<C: CourseDb>(
    conn: &mut C,
    chapter_id: i64,
    patch: &ChapterPatch,
) -> Result<UpdateOutcome, OrderingError> {
    update_sibling(
        conn,
        &CHAPTERS,
        chapter_id,
        patch.columns(),
        patch.chapter_order,
    )
}

pub fn delete_chapter<C: CourseDb>(conn: &mut C, chapter_id: i64) -> Result<(), OrderingError> {
    delete_sibling(conn, &CHAPTERS, chapter_id)
}

// Lessons

pub fn list_lessons<C: CourseDb>(
    conn: &mut C,
    chapter_id: i64,
) -> Result<Vec<Lesson>, OrderingError> {
    list_siblings(conn, &LESSONS, chapter_id)
}

pub fn get_lesson<C: CourseDb>(conn: &mut C, lesson_id: i64) -> Result<Lesson, OrderingError> {
    fetch_by_id(conn, "lesson", "lessons", "lesson_id", lesson_id)
}

pub fn create_lesson<C: CourseDb>(conn: &mut C, new: &NewLesson) -> Result<Lesson, OrderingError> {
    require_text("lesson_name", &new.lesson_name)?;
    let id = create_sibling(conn, &LESSONS, new.chapter_id, new.columns(), new.lesson_order)?;
    get_lesson(conn, id)
}

pub fn update_lesson<C: CourseDb>(
    conn: &mut C,
    lesson_id: i64,
    patch: &LessonPatch,
) -> Result<UpdateOutcome, OrderingError> {
    update_sibling(conn, &LESSONS, lesson_id, patch.columns(), patch.lesson_order)
}

pub fn delete_lesson<C: CourseDb>(conn: &mut C, lesson_id: i64) -> Result<(), OrderingError> {
    delete_sibling(conn, &LESSONS, lesson_id)
}

// Lesson contents

pub fn list_contents<C: CourseDb>(
    conn: &mut C,
    lesson_id: i64,
) -> Result<Vec<LessonContent>, OrderingError> {
    list_siblings(conn, &LESSON_CONTENTS, lesson_id)
}

pub fn get_content<C: CourseDb>(
    conn: &mut C,
    content_id: i64,
) -> Result<LessonContent, OrderingError> {
    fetch_by_id(conn, "content", "lesson_contents", "content_id", content_id)
}

pub fn create_content<C: CourseDb>(
    conn: &mut C,
    new: &NewContent,
) -> Result<LessonContent, OrderingError> {
    require_text("body", &new.body)?;
    let id = create_sibling(
        conn,
        &LESSON_CONTENTS,
        new.lesson_id,
        new.columns(),
        new.content_order,
    )?;
    get_content(conn, id)
}

pub fn update_content<C: CourseDb>(
    conn: &mut C,
    content_id: i64,
    patch: &ContentPatch,
) -> Result<UpdateOutcome, OrderingError> {
    update_sibling(
        conn,
        &LESSON_CONTENTS,
        content_id,
        patch.columns(),
        patch.content_order,
    )
}

pub fn delete_content<C: CourseDb>(conn: &mut C, content_id: i64) -> Result<(), OrderingError> {
    delete_sibling(conn, &LESSON_CONTENTS, content_id)
}

// Coding exercises

pub fn list_exercises<C: CourseDb>(
    conn: &mut C,
    parent: ExerciseParent,
) -> Result<Vec<CodingExercise>, OrderingError> {
    list_siblings(conn, parent.collection(), parent.parent_id())
}

pub fn get_exercise<C: CourseDb>(
    conn: &mut C,
    exercise_id: i64,
) -> Result<CodingExercise, OrderingError> {
    fetch_by_id(conn, "exercise", "coding_exercises", "exercise_id", exercise_id)
}

/// Appends an exercise to its lesson, or to its chapter when no lesson is given.
pub fn create_exercise<C: CourseDb>(
    conn: &mut C,
    new: &NewExercise,
) -> Result<CodingExercise, OrderingError> {
    let parent = new.parent().ok_or_else(|| {
        OrderingError::InvalidInput("exercise needs a lesson_id or a chapter_id".to_string())
    })?;
    require_text("title", &new.title)?;
    require_text("instruction", &new.instruction)?;

    let id = create_sibling(
        conn,
        parent.collection(),
        parent.parent_id(),
        new.columns(),
        new.exercise_order,
    )?;
    get_exercise(conn, id)
}

pub fn update_exercise<C: CourseDb>(
    conn: &mut C,
    exercise_id: i64,
    patch: &ExercisePatch,
) -> Result<UpdateOutcome, OrderingError> {
    // Both exercise collections share the table, id and order columns.
    update_sibling(
        conn,
        &LESSON_EXERCISES,
        exercise_id,
        patch.columns(),
        patch.exercise_order,
    )
}

pub fn delete_exercise<C: CourseDb>(conn: &mut C, exercise_id: i64) -> Result<(), OrderingError> {
    delete_sibling(conn, &LESSON_EXERCISES, exercise_id)
}

pub fn reorder_exercises<C: CourseDb>(
    conn: &mut C,
    parent: ExerciseParent,
    ordered_ids: &[i64],
    strict: bool,
) -> Result<ReorderOutcome, OrderingError> {
    reorder_children(
        conn,
        parent.collection(),
        parent.parent_id(),
        ordered_ids,
        strict,
    )
}

// Test cases

/// Test cases carry no order of their own; they list in creation order.
pub fn list_test_cases<C: CourseDb>(
    conn: &mut C,
    exercise_id: i64,
) -> Result<Vec<TestCase>, OrderingError> {
    Ok(conn.load_rows::<TestCase>(&format!(
        "SELECT * FROM test_cases WHERE exercise_id = {exercise_id} ORDER BY test_case_id ASC"
    ))?)
}

pub fn create_test_case<C: CourseDb>(
    conn: &mut C,
    new: &NewTestCase,
) -> Result<TestCase, OrderingError> {
    let exercise_sql = count_by_id("coding_exercises", "exercise_id", new.exercise_id);
    if count(conn, &exercise_sql)? == 0 {
        return Err(OrderingError::ParentMissing {
            parent: "exercise",
            parent_id: new.exercise_id,
        });
    }

    let columns = new.columns();
    reject_nul_text(&columns)?;
    let sql = insert_returning_id("test_cases", "test_case_id", &columns);
    let id = insert_returning(conn, &sql)?;
    debug!("created test case {id} for exercise {}", new.exercise_id);
    fetch_by_id(conn, "test case", "test_cases", "test_case_id", id)
}

pub fn update_test_case<C: CourseDb>(
    conn: &mut C,
    test_case_id: i64,
    patch: &TestCasePatch,
) -> Result<UpdateOutcome, OrderingError> {
    let columns = patch.columns();
    reject_nul_text(&columns)?;
    let Some(sql) = update_by_id("test_cases", "test_case_id", test_case_id, &columns) else {
        return Ok(UpdateOutcome::NothingToUpdate);
    };
    if conn.execute_sql(&sql)? == 0 {
        return Err(OrderingError::NotFound {
            entity: "test case",
            id: test_case_id,
        });
    }
    Ok(UpdateOutcome::Updated)
}

pub fn delete_test_case<C: CourseDb>(
    conn: &mut C,
    test_case_id: i64,
) -> Result<(), OrderingError> {
    if conn.execute_sql(&delete_by_id("test_cases", "test_case_id", test_case_id))? == 0 {
        return Err(OrderingError::NotFound {
            entity: "test case",
            id: test_case_id,
        });
    }
    Ok(())
}
