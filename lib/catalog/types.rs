use diesel::sql_types::{BigInt, Bool, Nullable, Text};
use diesel::QueryableByName;
use serde::{Deserialize, Deserializer, Serialize};

use crate::db::sql::{ColumnValue, Columns};
use crate::ordering::{SiblingCollection, CHAPTER_EXERCISES, LESSON_EXERCISES};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Course {
    #[diesel(sql_type = BigInt)]
    pub course_id: i64,
    #[diesel(sql_type = Text)]
    pub course_name: String,
    #[diesel(sql_type = Text)]
    pub main_language: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub course_description: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub course_image: Option<String>,
    #[diesel(sql_type = Text)]
    pub difficulty_level: String,
    #[diesel(sql_type = Bool)]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Chapter {
    #[diesel(sql_type = BigInt)]
    pub chapter_id: i64,
    #[diesel(sql_type = BigInt)]
    pub course_id: i64,
    #[diesel(sql_type = Text)]
    pub chapter_name: String,
    #[diesel(sql_type = BigInt)]
    pub chapter_order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct Lesson {
    #[diesel(sql_type = BigInt)]
    pub lesson_id: i64,
    #[diesel(sql_type = BigInt)]
    pub chapter_id: i64,
    #[diesel(sql_type = Text)]
    pub lesson_name: String,
    #[diesel(sql_type = BigInt)]
    pub lesson_order: i64,
}

/// One content block of a lesson. `content_type` is `theory` or `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct LessonContent {
    #[diesel(sql_type = BigInt)]
    pub content_id: i64,
    #[diesel(sql_type = BigInt)]
    pub lesson_id: i64,
    #[diesel(sql_type = Text)]
    pub content_type: String,
    #[diesel(sql_type = BigInt)]
    pub content_order: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub content_title: Option<String>,
    #[diesel(sql_type = Text)]
    pub body: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub code_language: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub code_explanation: Option<String>,
}

/// A coding exercise scoped to either a lesson or a whole chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct CodingExercise {
    #[diesel(sql_type = BigInt)]
    pub exercise_id: i64,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub lesson_id: Option<i64>,
    #[diesel(sql_type = Nullable<BigInt>)]
    pub chapter_id: Option<i64>,
    #[diesel(sql_type = BigInt)]
    pub exercise_order: i64,
    #[diesel(sql_type = Text)]
    pub title: String,
    #[diesel(sql_type = Text)]
    pub instruction: String,
    #[diesel(sql_type = Text)]
    pub difficulty: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub starter_code: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub solution_code: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    pub programming_language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, QueryableByName)]
#[diesel(check_for_backend(diesel::pg::Pg, diesel::sqlite::Sqlite))]
pub struct TestCase {
    #[diesel(sql_type = BigInt)]
    pub test_case_id: i64,
    #[diesel(sql_type = BigInt)]
    pub exercise_id: i64,
    #[diesel(sql_type = Nullable<Text>)]
    pub input: Option<String>,
    #[diesel(sql_type = Text)]
    pub expected_output: String,
    #[diesel(sql_type = Bool)]
    pub is_hidden: bool,
    #[diesel(sql_type = BigInt)]
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl CourseLevel {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            CourseLevel::Beginner => "Beginner",
            CourseLevel::Intermediate => "Intermediate",
            CourseLevel::Advanced => "Advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Theory,
    Code,
}

impl ContentType {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            ContentType::Theory => "theory",
            ContentType::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExerciseDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ExerciseDifficulty {
    pub(crate) fn as_db_str(self) -> &'static str {
        match self {
            ExerciseDifficulty::Easy => "Easy",
            ExerciseDifficulty::Medium => "Medium",
            ExerciseDifficulty::Hard => "Hard",
        }
    }
}

/// Which sibling list an exercise belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseParent {
    Lesson(i64),
    Chapter(i64),
}

impl ExerciseParent {
    pub fn collection(self) -> &'static SiblingCollection {
        match self {
            ExerciseParent::Lesson(_) => &LESSON_EXERCISES,
            ExerciseParent::Chapter(_) => &CHAPTER_EXERCISES,
        }
    }

    pub fn parent_id(self) -> i64 {
        match self {
            ExerciseParent::Lesson(id) | ExerciseParent::Chapter(id) => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourse {
    pub course_name: String,
    pub main_language: String,
    #[serde(default)]
    pub course_description: Option<String>,
    #[serde(default)]
    pub course_image: Option<String>,
    #[serde(default)]
    pub difficulty_level: Option<CourseLevel>,
}

/// Course edits. Empty strings are treated as "not provided".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoursePatch {
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub main_language: Option<String>,
    #[serde(default)]
    pub course_description: Option<String>,
    #[serde(default)]
    pub course_image: Option<String>,
    #[serde(default)]
    pub difficulty_level: Option<CourseLevel>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewChapter {
    pub course_id: i64,
    pub chapter_name: String,
    #[serde(default)]
    pub chapter_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChapterPatch {
    #[serde(default)]
    pub chapter_name: Option<String>,
    #[serde(default)]
    pub chapter_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLesson {
    pub chapter_id: i64,
    pub lesson_name: String,
    #[serde(default)]
    pub lesson_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LessonPatch {
    #[serde(default)]
    pub lesson_name: Option<String>,
    #[serde(default)]
    pub lesson_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewContent {
    pub lesson_id: i64,
    pub content_type: ContentType,
    #[serde(default)]
    pub content_order: Option<i64>,
    #[serde(default)]
    pub content_title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub code_language: Option<String>,
    #[serde(default)]
    pub code_explanation: Option<String>,
}

/// Content edits. `Some(None)` on a nullable field (JSON `null`) clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentPatch {
    #[serde(default)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    pub content_order: Option<i64>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub content_title: Option<Option<String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub code_language: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub code_explanation: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExercise {
    #[serde(default)]
    pub lesson_id: Option<i64>,
    #[serde(default)]
    pub chapter_id: Option<i64>,
    #[serde(default)]
    pub exercise_order: Option<i64>,
    pub title: String,
    pub instruction: String,
    #[serde(default)]
    pub difficulty: Option<ExerciseDifficulty>,
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub solution_code: Option<String>,
    #[serde(default)]
    pub programming_language: Option<String>,
}

impl NewExercise {
    /// A lesson id wins over a chapter id; an exercise needs one of them.
    pub fn parent(&self) -> Option<ExerciseParent> {
        match (self.lesson_id, self.chapter_id) {
            (Some(lesson_id), _) => Some(ExerciseParent::Lesson(lesson_id)),
            (None, Some(chapter_id)) => Some(ExerciseParent::Chapter(chapter_id)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExercisePatch {
    #[serde(default)]
    pub exercise_order: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub difficulty: Option<ExerciseDifficulty>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub starter_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub solution_code: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable_field")]
    pub programming_language: Option<Option<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTestCase {
    pub exercise_id: i64,
    #[serde(default)]
    pub input: Option<String>,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub points: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestCasePatch {
    #[serde(default, deserialize_with = "nullable_field")]
    pub input: Option<Option<String>>,
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub points: Option<i64>,
}

/// Distinguishes an absent field (`None`) from an explicit JSON `null` (`Some(None)`).
fn nullable_field<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn push_required(columns: &mut Columns, name: &'static str, value: &Option<String>) {
    if let Some(value) = value.as_deref().filter(|value| !value.trim().is_empty()) {
        columns.push((name, ColumnValue::from(value)));
    }
}

fn push_nullable(columns: &mut Columns, name: &'static str, value: &Option<Option<String>>) {
    if let Some(value) = value {
        columns.push((name, ColumnValue::from(value.clone())));
    }
}

fn push_value<T>(columns: &mut Columns, name: &'static str, value: Option<T>)
where
    T: Into<ColumnValue>,
{
    if let Some(value) = value {
        columns.push((name, value.into()));
    }
}

impl NewCourse {
    pub(crate) fn columns(&self) -> Columns {
        vec![
            ("course_name", ColumnValue::from(self.course_name.as_str())),
            ("main_language", ColumnValue::from(self.main_language.as_str())),
            (
                "course_description",
                ColumnValue::from(self.course_description.clone()),
            ),
            ("course_image", ColumnValue::from(self.course_image.clone())),
            (
                "difficulty_level",
                ColumnValue::from(
                    self.difficulty_level
                        .unwrap_or(CourseLevel::Beginner)
                        .as_db_str(),
                ),
            ),
        ]
    }
}

impl CoursePatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_required(&mut columns, "course_name", &self.course_name);
        push_required(&mut columns, "main_language", &self.main_language);
        push_required(&mut columns, "course_description", &self.course_description);
        push_required(&mut columns, "course_image", &self.course_image);
        push_value(
            &mut columns,
            "difficulty_level",
            self.difficulty_level.map(CourseLevel::as_db_str),
        );
        push_value(&mut columns, "is_active", self.is_active);
        columns
    }
}

impl NewChapter {
    pub(crate) fn columns(&self) -> Columns {
        vec![("chapter_name", ColumnValue::from(self.chapter_name.as_str()))]
    }
}

impl ChapterPatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_required(&mut columns, "chapter_name", &self.chapter_name);
        columns
    }
}

impl NewLesson {
    pub(crate) fn columns(&self) -> Columns {
        vec![("lesson_name", ColumnValue::from(self.lesson_name.as_str()))]
    }
}

impl LessonPatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_required(&mut columns, "lesson_name", &self.lesson_name);
        columns
    }
}

impl NewContent {
    pub(crate) fn columns(&self) -> Columns {
        vec![
            ("content_type", ColumnValue::from(self.content_type.as_db_str())),
            ("content_title", ColumnValue::from(self.content_title.clone())),
            ("body", ColumnValue::from(self.body.as_str())),
            ("code_language", ColumnValue::from(self.code_language.clone())),
            (
                "code_explanation",
                ColumnValue::from(self.code_explanation.clone()),
            ),
        ]
    }
}

impl ContentPatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_value(
            &mut columns,
            "content_type",
            self.content_type.map(ContentType::as_db_str),
        );
        push_nullable(&mut columns, "content_title", &self.content_title);
        push_required(&mut columns, "body", &self.body);
        push_nullable(&mut columns, "code_language", &self.code_language);
        push_nullable(&mut columns, "code_explanation", &self.code_explanation);
        columns
    }
}

impl NewExercise {
    pub(crate) fn columns(&self) -> Columns {
        vec![
            ("title", ColumnValue::from(self.title.as_str())),
            ("instruction", ColumnValue::from(self.instruction.as_str())),
            (
                "difficulty",
                ColumnValue::from(
                    self.difficulty
                        .unwrap_or(ExerciseDifficulty::Easy)
                        .as_db_str(),
                ),
            ),
            ("starter_code", ColumnValue::from(self.starter_code.clone())),
            ("solution_code", ColumnValue::from(self.solution_code.clone())),
            (
                "programming_language",
                ColumnValue::from(self.programming_language.clone()),
            ),
        ]
    }
}

impl ExercisePatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_required(&mut columns, "title", &self.title);
        push_required(&mut columns, "instruction", &self.instruction);
        push_value(
            &mut columns,
            "difficulty",
            self.difficulty.map(ExerciseDifficulty::as_db_str),
        );
        push_nullable(&mut columns, "starter_code", &self.starter_code);
        push_nullable(&mut columns, "solution_code", &self.solution_code);
        push_nullable(
            &mut columns,
            "programming_language",
            &self.programming_language,
        );
        columns
    }
}

impl NewTestCase {
    pub(crate) fn columns(&self) -> Columns {
        vec![
            ("exercise_id", ColumnValue::Int(self.exercise_id)),
            ("input", ColumnValue::from(self.input.clone())),
            (
                "expected_output",
                ColumnValue::from(self.expected_output.as_str()),
            ),
            ("is_hidden", ColumnValue::from(self.is_hidden.unwrap_or(true))),
            ("points", ColumnValue::Int(self.points.unwrap_or(1))),
        ]
    }
}

impl TestCasePatch {
    pub(crate) fn columns(&self) -> Columns {
        let mut columns = Columns::new();
        push_nullable(&mut columns, "input", &self.input);
        push_value(
            &mut columns,
            "expected_output",
            self.expected_output.as_deref(),
        );
        push_value(&mut columns, "is_hidden", self.is_hidden);
        push_value(&mut columns, "points", self.points);
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullable_patch_fields_distinguish_null_from_absent() {
        let patch: ContentPatch =
            serde_json::from_str(r#"{"content_title": null, "body": "new"}"#)
                .expect("valid patch");

        assert_eq!(patch.content_title, Some(None));
        assert_eq!(patch.code_language, None);
        assert_eq!(
            patch.columns(),
            vec![
                ("content_title", ColumnValue::Null),
                ("body", ColumnValue::from("new")),
            ]
        );
    }

    #[test]
    fn empty_required_strings_are_ignored() {
        let patch = ChapterPatch {
            chapter_name: Some("   ".to_string()),
            chapter_order: None,
        };
        assert!(patch.columns().is_empty());
    }

    #[test]
    fn exercise_parent_prefers_lesson() {
        let exercise: NewExercise = serde_json::from_str(
            r#"{"lesson_id": 4, "chapter_id": 2, "title": "FizzBuzz", "instruction": "Print"}"#,
        )
        .expect("valid exercise");
        assert_eq!(exercise.parent(), Some(ExerciseParent::Lesson(4)));
        assert_eq!(exercise.parent().map(ExerciseParent::parent_id), Some(4));

        let orphan: NewExercise =
            serde_json::from_str(r#"{"title": "Loose", "instruction": "None"}"#)
                .expect("valid exercise");
        assert_eq!(orphan.parent(), None);
    }

    #[test]
    fn content_type_uses_lowercase_wire_names() {
        let content: NewContent = serde_json::from_str(
            r#"{"lesson_id": 1, "content_type": "code", "body": "fn main() {}"}"#,
        )
        .expect("valid content");
        assert_eq!(content.content_type, ContentType::Code);

        assert!(serde_json::from_str::<NewContent>(
            r#"{"lesson_id": 1, "content_type": "video", "body": "x"}"#
        )
        .is_err());
    }
}
