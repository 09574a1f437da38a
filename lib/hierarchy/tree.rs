use std::collections::HashMap;

use diesel::result::Error as DieselError;
use diesel::sql_query;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::AsyncPgConnection;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{Chapter, CodingExercise, Course, Lesson, LessonContent};
use crate::db::CourseDb;
use crate::ordering::DensityReport;

/// Every row needed to build one course outline, loaded up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CourseSnapshot {
    pub course: Option<Course>,
    pub chapters: Vec<Chapter>,
    pub lessons: Vec<Lesson>,
    pub contents: Vec<LessonContent>,
    pub exercises: Vec<CodingExercise>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonNode {
    pub lesson: Lesson,
    pub contents: Vec<LessonContent>,
    pub exercises: Vec<CodingExercise>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterNode {
    pub chapter: Chapter,
    pub lessons: Vec<LessonNode>,
    /// Exercises attached to the chapter itself rather than one of its lessons.
    pub exercises: Vec<CodingExercise>,
}

/// A parent whose children do not hold a dense `1..=N` order.
///
/// Reported alongside the tree instead of failing the read; the outline is
/// still rendered in `(order, id)` sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderAnomaly {
    pub entity: &'static str,
    pub parent_entity: &'static str,
    pub parent_id: i64,
    pub report: DensityReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseHierarchy {
    pub course: Course,
    pub chapters: Vec<ChapterNode>,
    pub anomalies: Vec<OrderAnomaly>,
}

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("course {course_id} not found")]
    CourseNotFound { course_id: i64 },
    #[error("failed to load course hierarchy: {0}")]
    Database(#[from] DieselError),
}

fn course_sql(course_id: i64) -> String {
    format!("SELECT * FROM courses WHERE course_id = {course_id}")
}

fn chapters_sql(course_id: i64) -> String {
    format!(
        "SELECT * FROM chapters WHERE course_id = {course_id} \
         ORDER BY chapter_order ASC, chapter_id ASC"
    )
}

fn lessons_sql(course_id: i64) -> String {
    format!(
        "SELECT l.* FROM lessons l \
         JOIN chapters c ON c.chapter_id = l.chapter_id \
         WHERE c.course_id = {course_id} \
         ORDER BY l.chapter_id ASC, l.lesson_order ASC, l.lesson_id ASC"
    )
}

fn contents_sql(course_id: i64) -> String {
    format!(
        "SELECT lc.* FROM lesson_contents lc \
         JOIN lessons l ON l.lesson_id = lc.lesson_id \
         JOIN chapters c ON c.chapter_id = l.chapter_id \
         WHERE c.course_id = {course_id} \
         ORDER BY lc.lesson_id ASC, lc.content_order ASC, lc.content_id ASC"
    )
}

/// Lesson-scoped and chapter-scoped exercises of the course in one pass.
fn exercises_sql(course_id: i64) -> String {
    format!(
        "SELECT e.* FROM coding_exercises e \
         LEFT JOIN lessons l ON l.lesson_id = e.lesson_id \
         WHERE e.chapter_id IN (SELECT chapter_id FROM chapters WHERE course_id = {course_id}) \
            OR l.chapter_id IN (SELECT chapter_id FROM chapters WHERE course_id = {course_id}) \
         ORDER BY e.exercise_order ASC, e.exercise_id ASC"
    )
}

/// Loads one course snapshot over any synchronous connection.
///
/// All five reads share one transaction. A missing course short-circuits with
/// an empty snapshot; the caller decides whether that is an error (see
/// [`assemble_course_hierarchy`]).
pub fn load_course_snapshot<C: CourseDb>(
    conn: &mut C,
    course_id: i64,
) -> Result<CourseSnapshot, DieselError> {
    conn.in_transaction(|conn| {
        let course = conn.load_rows::<Course>(&course_sql(course_id))?.pop();
        if course.is_none() {
            return Ok(CourseSnapshot::default());
        }

        Ok(CourseSnapshot {
            course,
            chapters: conn.load_rows(&chapters_sql(course_id))?,
            lessons: conn.load_rows(&lessons_sql(course_id))?,
            contents: conn.load_rows(&contents_sql(course_id))?,
            exercises: conn.load_rows(&exercises_sql(course_id))?,
        })
    })
}

/// Async-Postgres variant of [`load_course_snapshot`] for the pooled read path.
///
/// Runs in a read-only `REPEATABLE READ` transaction so a reorder committed
/// mid-load cannot tear the outline.
pub async fn load_course_snapshot_async_pg(
    conn: &mut AsyncPgConnection,
    course_id: i64,
) -> Result<CourseSnapshot, DieselError> {
    conn.build_transaction()
        .read_only()
        .repeatable_read()
        .run(move |conn| read_course_snapshot_pg(conn, course_id).scope_boxed())
        .await
}

async fn read_course_snapshot_pg(
    conn: &mut AsyncPgConnection,
    course_id: i64,
) -> Result<CourseSnapshot, DieselError> {
    let course: Option<Course> =
        diesel_async::RunQueryDsl::load(sql_query(course_sql(course_id)), conn)
            .await?
            .pop();
    if course.is_none() {
        return Ok(CourseSnapshot::default());
    }

    let chapters: Vec<Chapter> =
        diesel_async::RunQueryDsl::load(sql_query(chapters_sql(course_id)), conn).await?;
    let lessons: Vec<Lesson> =
        diesel_async::RunQueryDsl::load(sql_query(lessons_sql(course_id)), conn).await?;
    let contents: Vec<LessonContent> =
        diesel_async::RunQueryDsl::load(sql_query(contents_sql(course_id)), conn).await?;
    let exercises: Vec<CodingExercise> =
        diesel_async::RunQueryDsl::load(sql_query(exercises_sql(course_id)), conn).await?;

    Ok(CourseSnapshot {
        course,
        chapters,
        lessons,
        contents,
        exercises,
    })
}

/// Async convenience wrapper: load then assemble.
pub async fn retrieve_course_hierarchy_async_pg(
    conn: &mut AsyncPgConnection,
    course_id: i64,
) -> Result<CourseHierarchy, HierarchyError> {
    let snapshot = load_course_snapshot_async_pg(conn, course_id).await?;
    assemble_course_hierarchy(snapshot, course_id)
}

pub fn retrieve_course_hierarchy<C: CourseDb>(
    conn: &mut C,
    course_id: i64,
) -> Result<CourseHierarchy, HierarchyError> {
    let snapshot = load_course_snapshot(conn, course_id)?;
    assemble_course_hierarchy(snapshot, course_id)
}

/// Builds the nested outline from a snapshot.
///
/// Children are sorted by `(order, id)` regardless of input order, and each
/// parent whose order values are not dense contributes one [`OrderAnomaly`].
/// Rows whose parent is not part of the snapshot are dropped.
pub fn assemble_course_hierarchy(
    snapshot: CourseSnapshot,
    course_id: i64,
) -> Result<CourseHierarchy, HierarchyError> {
    let course = snapshot
        .course
        .filter(|course| course.course_id == course_id)
        .ok_or(HierarchyError::CourseNotFound { course_id })?;

    let mut anomalies = Vec::new();

    let mut contents_by_lesson = HashMap::<i64, Vec<LessonContent>>::new();
    for content in snapshot.contents {
        contents_by_lesson
            .entry(content.lesson_id)
            .or_default()
            .push(content);
    }

    let mut exercises_by_lesson = HashMap::<i64, Vec<CodingExercise>>::new();
    let mut exercises_by_chapter = HashMap::<i64, Vec<CodingExercise>>::new();
    for exercise in snapshot.exercises {
        match (exercise.lesson_id, exercise.chapter_id) {
            (Some(lesson_id), _) => exercises_by_lesson
                .entry(lesson_id)
                .or_default()
                .push(exercise),
            (None, Some(chapter_id)) => exercises_by_chapter
                .entry(chapter_id)
                .or_default()
                .push(exercise),
            (None, None) => {}
        }
    }

    let mut lessons_by_chapter = HashMap::<i64, Vec<LessonNode>>::new();
    for lesson in snapshot.lessons {
        let lesson_id = lesson.lesson_id;
        let mut contents = contents_by_lesson.remove(&lesson_id).unwrap_or_default();
        contents.sort_by_key(|content| (content.content_order, content.content_id));
        check_density(
            &mut anomalies,
            "content",
            "lesson",
            lesson_id,
            contents.iter().map(|content| content.content_order),
        );

        let exercises = sorted_exercises(
            &mut anomalies,
            "lesson",
            lesson_id,
            exercises_by_lesson.remove(&lesson_id).unwrap_or_default(),
        );

        lessons_by_chapter
            .entry(lesson.chapter_id)
            .or_default()
            .push(LessonNode {
                lesson,
                contents,
                exercises,
            });
    }

    let mut chapters = snapshot
        .chapters
        .into_iter()
        .filter(|chapter| chapter.course_id == course_id)
        .collect::<Vec<_>>();
    chapters.sort_by_key(|chapter| (chapter.chapter_order, chapter.chapter_id));
    check_density(
        &mut anomalies,
        "chapter",
        "course",
        course_id,
        chapters.iter().map(|chapter| chapter.chapter_order),
    );

    let chapters = chapters
        .into_iter()
        .map(|chapter| {
            let chapter_id = chapter.chapter_id;
            let mut lessons = lessons_by_chapter.remove(&chapter_id).unwrap_or_default();
            lessons.sort_by_key(|node| (node.lesson.lesson_order, node.lesson.lesson_id));
            check_density(
                &mut anomalies,
                "lesson",
                "chapter",
                chapter_id,
                lessons.iter().map(|node| node.lesson.lesson_order),
            );

            let exercises = sorted_exercises(
                &mut anomalies,
                "chapter",
                chapter_id,
                exercises_by_chapter.remove(&chapter_id).unwrap_or_default(),
            );

            ChapterNode {
                chapter,
                lessons,
                exercises,
            }
        })
        .collect();

    Ok(CourseHierarchy {
        course,
        chapters,
        anomalies,
    })
}

fn sorted_exercises(
    anomalies: &mut Vec<OrderAnomaly>,
    parent_entity: &'static str,
    parent_id: i64,
    mut exercises: Vec<CodingExercise>,
) -> Vec<CodingExercise> {
    exercises.sort_by_key(|exercise| (exercise.exercise_order, exercise.exercise_id));
    check_density(
        anomalies,
        "exercise",
        parent_entity,
        parent_id,
        exercises.iter().map(|exercise| exercise.exercise_order),
    );
    exercises
}

fn check_density(
    anomalies: &mut Vec<OrderAnomaly>,
    entity: &'static str,
    parent_entity: &'static str,
    parent_id: i64,
    orders: impl Iterator<Item = i64>,
) {
    let report = DensityReport::from_orders(&orders.collect::<Vec<_>>());
    if !report.is_dense() {
        anomalies.push(OrderAnomaly {
            entity,
            parent_entity,
            parent_id,
            report,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        create_chapter, create_content, create_course, create_exercise, create_lesson,
        delete_lesson, reorder_children, ContentType, NewChapter, NewContent, NewCourse,
        NewExercise, NewLesson,
    };
    use crate::db::sqlite_test::setup_in_memory_sqlite;
    use crate::ordering::{CHAPTERS, LESSONS};
    use diesel::sqlite::SqliteConnection;

    fn course(id: i64) -> Course {
        Course {
            course_id: id,
            course_name: "Rust".to_string(),
            main_language: "rust".to_string(),
            course_description: None,
            course_image: None,
            difficulty_level: "Beginner".to_string(),
            is_active: true,
        }
    }

    fn chapter(id: i64, course_id: i64, order: i64) -> Chapter {
        Chapter {
            chapter_id: id,
            course_id,
            chapter_name: format!("chapter {id}"),
            chapter_order: order,
        }
    }

    fn lesson(id: i64, chapter_id: i64, order: i64) -> Lesson {
        Lesson {
            lesson_id: id,
            chapter_id,
            lesson_name: format!("lesson {id}"),
            lesson_order: order,
        }
    }

    fn exercise(id: i64, lesson_id: Option<i64>, chapter_id: Option<i64>, order: i64) -> CodingExercise {
        CodingExercise {
            exercise_id: id,
            lesson_id,
            chapter_id,
            exercise_order: order,
            title: format!("exercise {id}"),
            instruction: "solve".to_string(),
            difficulty: "Easy".to_string(),
            starter_code: None,
            solution_code: None,
            programming_language: None,
        }
    }

    #[test]
    fn assembles_children_in_order_regardless_of_input_order() {
        let snapshot = CourseSnapshot {
            course: Some(course(1)),
            chapters: vec![chapter(11, 1, 2), chapter(10, 1, 1)],
            lessons: vec![lesson(21, 10, 2), lesson(20, 10, 1), lesson(22, 11, 1)],
            contents: Vec::new(),
            exercises: vec![
                exercise(31, Some(20), None, 1),
                exercise(32, None, Some(11), 1),
            ],
        };

        let tree = assemble_course_hierarchy(snapshot, 1).expect("tree");

        assert!(tree.anomalies.is_empty());
        let chapter_ids = tree
            .chapters
            .iter()
            .map(|node| node.chapter.chapter_id)
            .collect::<Vec<_>>();
        assert_eq!(chapter_ids, vec![10, 11]);
        let lesson_ids = tree.chapters[0]
            .lessons
            .iter()
            .map(|node| node.lesson.lesson_id)
            .collect::<Vec<_>>();
        assert_eq!(lesson_ids, vec![20, 21]);
        assert_eq!(tree.chapters[0].lessons[0].exercises[0].exercise_id, 31);
        assert_eq!(tree.chapters[1].exercises[0].exercise_id, 32);
    }

    #[test]
    fn reports_gaps_and_duplicates_as_anomalies() {
        let snapshot = CourseSnapshot {
            course: Some(course(1)),
            chapters: vec![chapter(10, 1, 1), chapter(11, 1, 3)],
            lessons: vec![lesson(20, 10, 1), lesson(21, 10, 1)],
            contents: Vec::new(),
            exercises: Vec::new(),
        };

        let tree = assemble_course_hierarchy(snapshot, 1).expect("tree");

        assert_eq!(tree.anomalies.len(), 2);
        let chapter_gap = tree
            .anomalies
            .iter()
            .find(|anomaly| anomaly.entity == "chapter")
            .expect("chapter anomaly");
        assert_eq!(chapter_gap.parent_id, 1);
        assert_eq!(chapter_gap.report.missing, vec![2]);

        let lesson_dup = tree
            .anomalies
            .iter()
            .find(|anomaly| anomaly.entity == "lesson")
            .expect("lesson anomaly");
        assert_eq!(lesson_dup.parent_id, 10);
        assert_eq!(lesson_dup.report.duplicated, vec![1]);
        // Ties fall back to id order.
        assert_eq!(
            tree.chapters[0]
                .lessons
                .iter()
                .map(|node| node.lesson.lesson_id)
                .collect::<Vec<_>>(),
            vec![20, 21]
        );
    }

    #[test]
    fn missing_course_is_an_error() {
        let err = assemble_course_hierarchy(CourseSnapshot::default(), 5).expect_err("no course");
        assert!(matches!(err, HierarchyError::CourseNotFound { course_id: 5 }));
    }

    fn seed(conn: &mut SqliteConnection) -> (i64, Vec<i64>, Vec<i64>) {
        let course_id = create_course(
            conn,
            &NewCourse {
                course_name: "Rust".to_string(),
                main_language: "rust".to_string(),
                course_description: None,
                course_image: None,
                difficulty_level: None,
            },
        )
        .expect("course")
        .course_id;

        let chapters = ["Basics", "Ownership"]
            .iter()
            .map(|name| {
                create_chapter(
                    conn,
                    &NewChapter {
                        course_id,
                        chapter_name: name.to_string(),
                        chapter_order: None,
                    },
                )
                .expect("chapter")
                .chapter_id
            })
            .collect::<Vec<_>>();

        let lessons = ["Variables", "Loops", "Functions"]
            .iter()
            .map(|name| {
                create_lesson(
                    conn,
                    &NewLesson {
                        chapter_id: chapters[0],
                        lesson_name: name.to_string(),
                        lesson_order: None,
                    },
                )
                .expect("lesson")
                .lesson_id
            })
            .collect::<Vec<_>>();

        create_content(
            conn,
            &NewContent {
                lesson_id: lessons[0],
                content_type: ContentType::Theory,
                content_order: None,
                content_title: Some("Bindings".to_string()),
                body: "let x = 1;".to_string(),
                code_language: None,
                code_explanation: None,
            },
        )
        .expect("content");

        create_exercise(
            conn,
            &NewExercise {
                lesson_id: None,
                chapter_id: Some(chapters[1]),
                exercise_order: None,
                title: "Borrow checker quiz".to_string(),
                instruction: "Fix the borrow".to_string(),
                difficulty: None,
                starter_code: None,
                solution_code: None,
                programming_language: None,
            },
        )
        .expect("exercise");

        (course_id, chapters, lessons)
    }

    #[test]
    fn sqlite_snapshot_reflects_reorders_and_deletes() {
        let mut conn = setup_in_memory_sqlite();
        let (course_id, chapters, lessons) = seed(&mut conn);

        reorder_children(&mut conn, &CHAPTERS, course_id, &[chapters[1], chapters[0]], false)
            .expect("reorder chapters");
        delete_lesson(&mut conn, lessons[1]).expect("delete middle lesson");

        let tree = retrieve_course_hierarchy(&mut conn, course_id).expect("tree");

        assert_eq!(tree.chapters[0].chapter.chapter_id, chapters[1]);
        assert_eq!(tree.chapters[0].exercises.len(), 1);
        let basics = &tree.chapters[1];
        assert_eq!(
            basics
                .lessons
                .iter()
                .map(|node| node.lesson.lesson_id)
                .collect::<Vec<_>>(),
            vec![lessons[0], lessons[2]]
        );
        assert_eq!(basics.lessons[0].contents.len(), 1);
        assert_eq!(
            tree.anomalies,
            vec![OrderAnomaly {
                entity: "lesson",
                parent_entity: "chapter",
                parent_id: chapters[0],
                report: DensityReport::from_orders(&[1, 3]),
            }]
        );

        reorder_children(&mut conn, &LESSONS, chapters[0], &[lessons[0], lessons[2]], true)
            .expect("recompact");
        let tree = retrieve_course_hierarchy(&mut conn, course_id).expect("tree");
        assert!(tree.anomalies.is_empty());
    }

    #[test]
    fn sqlite_snapshot_for_unknown_course_is_not_found() {
        let mut conn = setup_in_memory_sqlite();
        let err = retrieve_course_hierarchy(&mut conn, 404).expect_err("missing");
        assert!(matches!(err, HierarchyError::CourseNotFound { course_id: 404 }));
    }

    /// Records, per loaded statement, whether it ran inside `in_transaction`.
    struct ScopeRecordingDb {
        conn: SqliteConnection,
        in_scope: bool,
        reads: Vec<bool>,
    }

    impl CourseDb for ScopeRecordingDb {
        fn execute_sql(&mut self, sql: &str) -> Result<usize, DieselError> {
            self.conn.execute_sql(sql)
        }

        fn load_rows<R: crate::db::DbRow>(&mut self, sql: &str) -> Result<Vec<R>, DieselError> {
            self.reads.push(self.in_scope);
            self.conn.load_rows(sql)
        }

        fn in_transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
        where
            F: FnOnce(&mut Self) -> Result<T, E>,
            E: From<DieselError>,
        {
            self.in_scope = true;
            let result = f(self);
            self.in_scope = false;
            result
        }
    }

    #[test]
    fn snapshot_reads_share_one_transaction() {
        let mut conn = setup_in_memory_sqlite();
        let course_id = create_course(
            &mut conn,
            &NewCourse {
                course_name: "Rust".to_string(),
                main_language: "rust".to_string(),
                course_description: None,
                course_image: None,
                difficulty_level: None,
            },
        )
        .expect("course")
        .course_id;
        create_chapter(
            &mut conn,
            &NewChapter {
                course_id,
                chapter_name: "Basics".to_string(),
                chapter_order: None,
            },
        )
        .expect("chapter");

        let mut db = ScopeRecordingDb {
            conn,
            in_scope: false,
            reads: Vec::new(),
        };
        let snapshot = load_course_snapshot(&mut db, course_id).expect("snapshot");

        assert_eq!(snapshot.chapters.len(), 1);
        assert_eq!(db.reads, vec![true; 5]);
    }
}
