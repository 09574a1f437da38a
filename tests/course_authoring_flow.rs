#![cfg(feature = "sqlite-tests")]

use codepulse_lib::catalog::{
    create_chapter, create_content, create_course, create_exercise, create_lesson,
    delete_content, list_contents, reorder_children, reorder_exercises, ContentType,
    ExerciseParent, NewChapter, NewContent, NewCourse, NewExercise, NewLesson,
};
use codepulse_lib::db::sqlite_test::{fail_order_updates_for, setup_in_memory_sqlite};
use codepulse_lib::hierarchy::{
    retrieve_course_hierarchy, HierarchyViewState, NodeKey, OutlineKind,
};
use codepulse_lib::ordering::{
    compact_siblings, density_report, OrderingError, LESSONS, LESSON_CONTENTS,
};
use diesel::sqlite::SqliteConnection;

fn content(lesson_id: i64, body: &str) -> NewContent {
    NewContent {
        lesson_id,
        content_type: ContentType::Theory,
        content_order: None,
        content_title: Some(body.to_string()),
        body: body.to_string(),
        code_language: None,
        code_explanation: None,
    }
}

struct Seeded {
    course_id: i64,
    chapter_id: i64,
    lesson_ids: Vec<i64>,
}

fn seed_course(conn: &mut SqliteConnection) -> Seeded {
    let course_id = create_course(
        conn,
        &NewCourse {
            course_name: "Rust from scratch".to_string(),
            main_language: "rust".to_string(),
            course_description: Some("Systems programming".to_string()),
            course_image: None,
            difficulty_level: None,
        },
    )
    .expect("course")
    .course_id;

    let chapter_id = create_chapter(
        conn,
        &NewChapter {
            course_id,
            chapter_name: "Getting started".to_string(),
            chapter_order: None,
        },
    )
    .expect("chapter")
    .chapter_id;

    let lesson_ids = ["Install", "Hello", "Cargo"]
        .iter()
        .map(|name| {
            create_lesson(
                conn,
                &NewLesson {
                    chapter_id,
                    lesson_name: name.to_string(),
                    lesson_order: None,
                },
            )
            .expect("lesson")
            .lesson_id
        })
        .collect();

    Seeded {
        course_id,
        chapter_id,
        lesson_ids,
    }
}

#[test]
fn editor_session_reorders_and_sees_the_new_outline() {
    let mut conn = setup_in_memory_sqlite();
    let seeded = seed_course(&mut conn);
    let [install, hello, cargo] = [
        seeded.lesson_ids[0],
        seeded.lesson_ids[1],
        seeded.lesson_ids[2],
    ];

    for body in ["intro", "steps", "recap"] {
        create_content(&mut conn, &content(hello, body)).expect("content");
    }

    let outcome = reorder_children(
        &mut conn,
        &LESSONS,
        seeded.chapter_id,
        &[cargo, install, hello],
        true,
    )
    .expect("strict reorder");
    assert!(outcome.is_complete_permutation());

    let tree = retrieve_course_hierarchy(&mut conn, seeded.course_id).expect("tree");
    let mut view = HierarchyViewState::new();
    view.select_course(seeded.course_id);
    view.expand(NodeKey::Chapter(seeded.chapter_id));
    view.expand(NodeKey::Lesson(hello));
    assert_eq!(view.prune(&tree), 0);

    let rows = view.visible_outline(&tree);
    let labels = rows
        .iter()
        .map(|row| (row.depth, row.kind, row.label.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        labels,
        vec![
            (0, OutlineKind::Chapter, "Getting started"),
            (1, OutlineKind::Lesson, "Cargo"),
            (1, OutlineKind::Lesson, "Install"),
            (1, OutlineKind::Lesson, "Hello"),
            (2, OutlineKind::Content, "intro"),
            (2, OutlineKind::Content, "steps"),
            (2, OutlineKind::Content, "recap"),
        ]
    );
}

#[test]
fn gaps_from_deletes_are_reported_until_compacted() {
    let mut conn = setup_in_memory_sqlite();
    let seeded = seed_course(&mut conn);
    let lesson = seeded.lesson_ids[0];

    let ids = ["a", "b", "c", "d"]
        .iter()
        .map(|body| {
            create_content(&mut conn, &content(lesson, body))
                .expect("content")
                .content_id
        })
        .collect::<Vec<_>>();
    delete_content(&mut conn, ids[1]).expect("delete");

    let tree = retrieve_course_hierarchy(&mut conn, seeded.course_id).expect("tree");
    assert_eq!(tree.anomalies.len(), 1);
    assert_eq!(tree.anomalies[0].entity, "content");
    assert_eq!(tree.anomalies[0].parent_id, lesson);

    let outcome = compact_siblings(&mut conn, &LESSON_CONTENTS, lesson).expect("compact");
    assert_eq!(outcome.updated, 3);
    let orders = list_contents(&mut conn, lesson)
        .expect("list")
        .into_iter()
        .map(|row| (row.content_id, row.content_order))
        .collect::<Vec<_>>();
    assert_eq!(orders, vec![(ids[0], 1), (ids[2], 2), (ids[3], 3)]);

    let tree = retrieve_course_hierarchy(&mut conn, seeded.course_id).expect("tree");
    assert!(tree.anomalies.is_empty());
}

#[test]
fn failed_exercise_reorder_leaves_every_order_unchanged() {
    let mut conn = setup_in_memory_sqlite();
    let seeded = seed_course(&mut conn);
    let lesson = seeded.lesson_ids[2];

    let ids = ["first", "second", "third"]
        .iter()
        .map(|title| {
            create_exercise(
                &mut conn,
                &NewExercise {
                    lesson_id: Some(lesson),
                    chapter_id: None,
                    exercise_order: None,
                    title: title.to_string(),
                    instruction: "solve".to_string(),
                    difficulty: None,
                    starter_code: None,
                    solution_code: None,
                    programming_language: None,
                },
            )
            .expect("exercise")
            .exercise_id
        })
        .collect::<Vec<_>>();

    fail_order_updates_for(&mut conn, "coding_exercises", "exercise_id", ids[0]);
    let err = reorder_exercises(
        &mut conn,
        ExerciseParent::Lesson(lesson),
        &[ids[2], ids[1], ids[0]],
        false,
    )
    .expect_err("last update aborts");
    assert!(matches!(err, OrderingError::TransactionFailure { .. }));

    let parent = ExerciseParent::Lesson(lesson);
    let report = density_report(&mut conn, parent.collection(), lesson).expect("density");
    assert!(report.is_dense());
    let tree = retrieve_course_hierarchy(&mut conn, seeded.course_id).expect("tree");
    let titles = tree.chapters[0]
        .lessons
        .iter()
        .find(|node| node.lesson.lesson_id == lesson)
        .expect("lesson node")
        .exercises
        .iter()
        .map(|exercise| exercise.title.as_str())
        .collect::<Vec<_>>();
    assert_eq!(titles, vec!["first", "second", "third"]);
}
