#![cfg(feature = "sqlite-tests")]

use codepulse_lib::db::sqlite_test::setup_in_memory_sqlite;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    name: String,
}

#[test]
fn sqlite_harness_runs_expected_schema_migrations() {
    let mut conn = setup_in_memory_sqlite();

    let rows: Vec<NameRow> = sql_query(
        "
        SELECT name
        FROM sqlite_master
        WHERE type = 'table'
          AND name IN ('courses', 'chapters', 'lessons', 'lesson_contents',
                       'coding_exercises', 'test_cases')
        ORDER BY name
        ",
    )
    .load(&mut conn)
    .expect("failed to query sqlite_master");

    let names: Vec<String> = rows.into_iter().map(|row| row.name).collect();
    assert_eq!(
        names,
        vec![
            "chapters".to_string(),
            "coding_exercises".to_string(),
            "courses".to_string(),
            "lesson_contents".to_string(),
            "lessons".to_string(),
            "test_cases".to_string(),
        ]
    );
}

#[test]
fn sqlite_harness_creates_parent_order_indexes() {
    let mut conn = setup_in_memory_sqlite();

    let index_count: CountRow = sql_query(
        "
        SELECT COUNT(*) AS count
        FROM sqlite_master
        WHERE type = 'index'
          AND name IN ('idx_chapters_course_order', 'idx_lessons_chapter_order',
                       'idx_lesson_contents_lesson_order')
        ",
    )
    .get_result(&mut conn)
    .expect("failed to query sqlite index metadata");

    assert_eq!(index_count.count, 3);
}

#[test]
fn sqlite_harness_rejects_non_positive_order_values() {
    let mut conn = setup_in_memory_sqlite();

    sql_query("INSERT INTO courses (course_name, main_language) VALUES ('Rust', 'rust')")
        .execute(&mut conn)
        .expect("failed to insert course");

    let bad_order = sql_query(
        "
        INSERT INTO chapters (course_id, chapter_name, chapter_order)
        VALUES (1, 'Zero', 0)
        ",
    )
    .execute(&mut conn)
    .expect_err("expected order check constraint to fail");
    assert!(
        bad_order.to_string().contains("CHECK constraint failed"),
        "unexpected sqlite error: {bad_order}"
    );

    // Duplicate order values are allowed by the schema.
    for name in ["One", "Also one"] {
        sql_query(format!(
            "INSERT INTO chapters (course_id, chapter_name, chapter_order) VALUES (1, '{name}', 1)"
        ))
        .execute(&mut conn)
        .expect("duplicate order should be accepted");
    }
}

#[test]
fn sqlite_harness_cascades_course_delete_to_every_level() {
    let mut conn = setup_in_memory_sqlite();

    for statement in [
        "INSERT INTO courses (course_name, main_language) VALUES ('Rust', 'rust')",
        "INSERT INTO chapters (course_id, chapter_name, chapter_order) VALUES (1, 'Basics', 1)",
        "INSERT INTO lessons (chapter_id, lesson_name, lesson_order) VALUES (1, 'Vars', 1)",
        "INSERT INTO lesson_contents (lesson_id, content_type, content_order, body) \
         VALUES (1, 'theory', 1, 'let')",
        "INSERT INTO coding_exercises (lesson_id, exercise_order, title, instruction) \
         VALUES (1, 1, 'Sum', 'Add')",
        "INSERT INTO test_cases (exercise_id, expected_output) VALUES (1, '3')",
    ] {
        sql_query(statement)
            .execute(&mut conn)
            .expect("failed to seed hierarchy");
    }

    sql_query("DELETE FROM courses WHERE course_id = 1")
        .execute(&mut conn)
        .expect("failed to delete course");

    let remaining: CountRow = sql_query(
        "
        SELECT (SELECT COUNT(*) FROM chapters)
             + (SELECT COUNT(*) FROM lessons)
             + (SELECT COUNT(*) FROM lesson_contents)
             + (SELECT COUNT(*) FROM coding_exercises)
             + (SELECT COUNT(*) FROM test_cases) AS count
        ",
    )
    .get_result(&mut conn)
    .expect("failed to count remaining rows");

    assert_eq!(remaining.count, 0);
}
