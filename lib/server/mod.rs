pub mod monitoring;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use diesel::pg::PgConnection;
use diesel::Connection;
use prometheus_client::encoding::text::encode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::{
    self, Chapter, ChapterPatch, CodingExercise, ContentPatch, Course, CoursePatch,
    ExerciseParent, ExercisePatch, Lesson, LessonContent, LessonPatch, NewChapter, NewContent,
    NewCourse, NewExercise, NewLesson, NewTestCase, TestCase, TestCasePatch,
};
use crate::hierarchy::{retrieve_course_hierarchy_async_pg, CourseHierarchy, HierarchyError};
use crate::ordering::{
    OrderingError, ReorderOutcome, SiblingCollection, UpdateOutcome, CHAPTERS, LESSONS,
    LESSON_CONTENTS,
};
use crate::state::AppState;
use monitoring::{EntityLabels, OrderingMetrics, ORDERING_METRICS};

/// Error surface of every API handler, rendered as `{ "error": message }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
    #[error("database connection unavailable: {0}")]
    Unavailable(String),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Ordering(OrderingError::InvalidInput(message.into()))
    }

    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Ordering(err) => match err {
                OrderingError::NotFound { .. } | OrderingError::ParentMissing { .. } => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                OrderingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, err.to_string()),
                OrderingError::TransactionFailure { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "reorder failed".to_string(),
                ),
                OrderingError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Hierarchy(err) => match err {
                HierarchyError::CourseNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
                HierarchyError::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                }
            },
            ApiError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "database connection unavailable".to_string(),
            ),
            ApiError::Join(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(
                event = "api_request_failed",
                status = status.as_u16(),
                error = %self,
                "request failed"
            );
        }
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs a synchronous store operation on the blocking pool with its own connection.
async fn run_blocking<T, F>(state: &AppState, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, OrderingError> + Send + 'static,
{
    let db_url = state.db_url.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&db_url).map_err(|err| {
            ApiError::Unavailable(format!("failed to connect to postgres: {err}"))
        })?;
        op(&mut conn).map_err(ApiError::from)
    })
    .await?
}

fn parse_body<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body)
        .map_err(|err| ApiError::invalid(format!("invalid request body: {err}")))
}

/// Id list and strictness flag of one reorder request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderRequest {
    pub ids: Vec<i64>,
    pub strict: bool,
}

/// Reads `body[key]` as an array of integer ids plus the optional `"strict"` flag.
pub fn parse_reorder_request(body: &Value, key: &str) -> ApiResult<ReorderRequest> {
    let entries = body
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::invalid(format!("{key} must be an array")))?;

    let ids = entries
        .iter()
        .map(|entry| {
            entry
                .as_i64()
                .ok_or_else(|| ApiError::invalid(format!("{key} must contain only integer ids")))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let strict = match body.get("strict") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(strict)) => *strict,
        Some(_) => return Err(ApiError::invalid("strict must be a boolean")),
    };

    Ok(ReorderRequest { ids, strict })
}

fn metrics() -> Option<&'static OrderingMetrics> {
    ORDERING_METRICS.get()
}

fn record_created(entity: &'static str) {
    if let Some(metrics) = metrics() {
        metrics
            .items_created_total
            .get_or_create(&EntityLabels::new(entity))
            .inc();
    }
}

fn record_deleted(entity: &'static str) {
    if let Some(metrics) = metrics() {
        metrics
            .items_deleted_total
            .get_or_create(&EntityLabels::new(entity))
            .inc();
    }
}

fn record_reorder(entity: &'static str, result: &ApiResult<ReorderOutcome>) {
    let Some(metrics) = metrics() else {
        return;
    };
    let labels = EntityLabels::new(entity);
    match result {
        Ok(outcome) => {
            metrics.reorders_committed_total.get_or_create(&labels).inc();
            if !outcome.skipped.is_empty() {
                metrics
                    .foreign_ids_skipped_total
                    .get_or_create(&labels)
                    .inc_by(outcome.skipped.len() as u64);
            }
        }
        Err(ApiError::Ordering(OrderingError::TransactionFailure { .. })) => {
            metrics.reorders_rolled_back_total.get_or_create(&labels).inc();
        }
        Err(_) => {}
    }
}

fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

fn update_response(entity: &str, outcome: UpdateOutcome) -> Json<Value> {
    let text = match outcome {
        UpdateOutcome::Updated => format!("{entity} updated"),
        UpdateOutcome::NothingToUpdate => format!("nothing to update for {entity}"),
    };
    Json(json!({ "message": text, "outcome": outcome }))
}

async fn reorder(
    state: &AppState,
    collection: &'static SiblingCollection,
    parent_id: i64,
    body: &Value,
    key: &str,
) -> ApiResult<Json<Value>> {
    let request = parse_reorder_request(body, key)?;
    let strict = request.strict;
    let result = run_blocking(state, move |conn| {
        catalog::reorder_children(conn, collection, parent_id, &request.ids, strict)
    })
    .await;
    record_reorder(collection.entity, &result);

    let outcome = result?;
    if !outcome.is_complete_permutation() {
        warn!(
            event = "reorder_partial",
            entity = collection.entity,
            parent_id,
            skipped = outcome.skipped.len(),
            unlisted = outcome.unlisted.len(),
            "reorder request was not a full permutation of the current children"
        );
    }
    Ok(Json(json!({
        "message": format!("{} order updated", collection.entity),
        "outcome": outcome,
    })))
}

async fn health_handler() -> &'static str {
    "Healthy"
}

async fn expose_metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    let mut buffer = String::new();
    let registry = state.registry.read().await;
    encode(&mut buffer, &registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(buffer)
}

// Courses

async fn list_courses(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Course>>> {
    run_blocking(&state, |conn| catalog::list_courses(conn))
        .await
        .map(Json)
}

async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<Course>> {
    run_blocking(&state, move |conn| catalog::get_course(conn, course_id))
        .await
        .map(Json)
}

async fn create_course(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    let new: NewCourse = parse_body(body)?;
    let course = run_blocking(&state, move |conn| catalog::create_course(conn, &new)).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn update_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: CoursePatch = parse_body(body)?;
    let outcome =
        run_blocking(&state, move |conn| catalog::update_course(conn, course_id, &patch)).await?;
    Ok(update_response("course", outcome))
}

async fn delete_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_course(conn, course_id)).await?;
    Ok(message("course deleted"))
}

async fn get_course_hierarchy(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<CourseHierarchy>> {
    let mut conn = state.pool.get().await.map_err(|err| {
        error!(
            event = "pool_get_failed",
            error = %err,
            "failed to fetch database connection from pool"
        );
        ApiError::Unavailable(err.to_string())
    })?;

    let hierarchy = retrieve_course_hierarchy_async_pg(&mut conn, course_id).await?;
    if !hierarchy.anomalies.is_empty() {
        info!(
            event = "hierarchy_order_anomalies",
            course_id,
            anomalies = hierarchy.anomalies.len(),
            "course has parents with non-dense sibling order"
        );
    }
    Ok(Json(hierarchy))
}

// Chapters

async fn list_chapters(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
) -> ApiResult<Json<Vec<Chapter>>> {
    run_blocking(&state, move |conn| catalog::list_chapters(conn, course_id))
        .await
        .map(Json)
}

async fn create_chapter(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Chapter>)> {
    let new: NewChapter = parse_body(body)?;
    let chapter = run_blocking(&state, move |conn| catalog::create_chapter(conn, &new)).await?;
    record_created(CHAPTERS.entity);
    Ok((StatusCode::CREATED, Json(chapter)))
}

async fn update_chapter(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: ChapterPatch = parse_body(body)?;
    let outcome =
        run_blocking(&state, move |conn| catalog::update_chapter(conn, chapter_id, &patch))
            .await?;
    Ok(update_response("chapter", outcome))
}

async fn delete_chapter(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_chapter(conn, chapter_id)).await?;
    record_deleted(CHAPTERS.entity);
    Ok(message("chapter deleted"))
}

async fn reorder_chapters(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    reorder(&state, &CHAPTERS, course_id, &body, "chapterIds").await
}

// Lessons

async fn list_lessons(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
) -> ApiResult<Json<Vec<Lesson>>> {
    run_blocking(&state, move |conn| catalog::list_lessons(conn, chapter_id))
        .await
        .map(Json)
}

async fn create_lesson(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<Lesson>)> {
    let new: NewLesson = parse_body(body)?;
    let lesson = run_blocking(&state, move |conn| catalog::create_lesson(conn, &new)).await?;
    record_created(LESSONS.entity);
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn update_lesson(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: LessonPatch = parse_body(body)?;
    let outcome =
        run_blocking(&state, move |conn| catalog::update_lesson(conn, lesson_id, &patch)).await?;
    Ok(update_response("lesson", outcome))
}

async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_lesson(conn, lesson_id)).await?;
    record_deleted(LESSONS.entity);
    Ok(message("lesson deleted"))
}

async fn reorder_lessons(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    reorder(&state, &LESSONS, chapter_id, &body, "lessonIds").await
}

// Lesson contents

async fn list_contents(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
) -> ApiResult<Json<Vec<LessonContent>>> {
    run_blocking(&state, move |conn| catalog::list_contents(conn, lesson_id))
        .await
        .map(Json)
}

async fn create_content(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<LessonContent>)> {
    let new: NewContent = parse_body(body)?;
    let content = run_blocking(&state, move |conn| catalog::create_content(conn, &new)).await?;
    record_created(LESSON_CONTENTS.entity);
    Ok((StatusCode::CREATED, Json(content)))
}

async fn update_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: ContentPatch = parse_body(body)?;
    let outcome =
        run_blocking(&state, move |conn| catalog::update_content(conn, content_id, &patch))
            .await?;
    Ok(update_response("content", outcome))
}

async fn delete_content(
    State(state): State<Arc<AppState>>,
    Path(content_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_content(conn, content_id)).await?;
    record_deleted(LESSON_CONTENTS.entity);
    Ok(message("content deleted"))
}

async fn reorder_contents(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    reorder(&state, &LESSON_CONTENTS, lesson_id, &body, "contentIds").await
}

// Exercises and test cases

async fn list_lesson_exercises(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
) -> ApiResult<Json<Vec<CodingExercise>>> {
    let parent = ExerciseParent::Lesson(lesson_id);
    run_blocking(&state, move |conn| catalog::list_exercises(conn, parent))
        .await
        .map(Json)
}

async fn list_chapter_exercises(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
) -> ApiResult<Json<Vec<CodingExercise>>> {
    let parent = ExerciseParent::Chapter(chapter_id);
    run_blocking(&state, move |conn| catalog::list_exercises(conn, parent))
        .await
        .map(Json)
}

async fn get_exercise(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<i64>,
) -> ApiResult<Json<CodingExercise>> {
    run_blocking(&state, move |conn| catalog::get_exercise(conn, exercise_id))
        .await
        .map(Json)
}

async fn create_exercise(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<CodingExercise>)> {
    let new: NewExercise = parse_body(body)?;
    let exercise = run_blocking(&state, move |conn| catalog::create_exercise(conn, &new)).await?;
    record_created("exercise");
    Ok((StatusCode::CREATED, Json(exercise)))
}

async fn update_exercise(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: ExercisePatch = parse_body(body)?;
    let outcome =
        run_blocking(&state, move |conn| catalog::update_exercise(conn, exercise_id, &patch))
            .await?;
    Ok(update_response("exercise", outcome))
}

async fn delete_exercise(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_exercise(conn, exercise_id)).await?;
    record_deleted("exercise");
    Ok(message("exercise deleted"))
}

async fn reorder_lesson_exercises(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let parent = ExerciseParent::Lesson(lesson_id);
    reorder(&state, parent.collection(), lesson_id, &body, "exerciseIds").await
}

async fn reorder_chapter_exercises(
    State(state): State<Arc<AppState>>,
    Path(chapter_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let parent = ExerciseParent::Chapter(chapter_id);
    reorder(&state, parent.collection(), chapter_id, &body, "exerciseIds").await
}

async fn list_test_cases(
    State(state): State<Arc<AppState>>,
    Path(exercise_id): Path<i64>,
) -> ApiResult<Json<Vec<TestCase>>> {
    run_blocking(&state, move |conn| catalog::list_test_cases(conn, exercise_id))
        .await
        .map(Json)
}

async fn create_test_case(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<TestCase>)> {
    let new: NewTestCase = parse_body(body)?;
    let test_case =
        run_blocking(&state, move |conn| catalog::create_test_case(conn, &new)).await?;
    Ok((StatusCode::CREATED, Json(test_case)))
}

async fn update_test_case(
    State(state): State<Arc<AppState>>,
    Path(test_case_id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: TestCasePatch = parse_body(body)?;
    let outcome = run_blocking(&state, move |conn| {
        catalog::update_test_case(conn, test_case_id, &patch)
    })
    .await?;
    Ok(update_response("test case", outcome))
}

async fn delete_test_case(
    State(state): State<Arc<AppState>>,
    Path(test_case_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    run_blocking(&state, move |conn| catalog::delete_test_case(conn, test_case_id)).await?;
    Ok(message("test case deleted"))
}

pub const COURSE_ROUTE: &str = "/api/courses/{course_id}";
pub const COURSE_HIERARCHY_ROUTE: &str = "/api/courses/{course_id}/hierarchy";

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/courses", get(list_courses).post(create_course))
        .route(
            COURSE_ROUTE,
            get(get_course).put(update_course).delete(delete_course),
        )
        .route(COURSE_HIERARCHY_ROUTE, get(get_course_hierarchy))
        .route("/api/chapters", post(create_chapter))
        .route("/api/chapters/course/{course_id}", get(list_chapters))
        .route(
            "/api/chapters/{chapter_id}",
            put(update_chapter).delete(delete_chapter),
        )
        .route("/api/chapters/reorder/{course_id}", post(reorder_chapters))
        .route("/api/lessons", post(create_lesson))
        .route("/api/lessons/chapter/{chapter_id}", get(list_lessons))
        .route(
            "/api/lessons/{lesson_id}",
            put(update_lesson).delete(delete_lesson),
        )
        .route("/api/lessons/reorder/{chapter_id}", post(reorder_lessons))
        .route("/api/contents", post(create_content))
        .route("/api/contents/lesson/{lesson_id}", get(list_contents))
        .route(
            "/api/contents/{content_id}",
            put(update_content).delete(delete_content),
        )
        .route("/api/contents/reorder/{lesson_id}", post(reorder_contents))
        .route("/api/exercises", post(create_exercise))
        .route("/api/exercises/lesson/{lesson_id}", get(list_lesson_exercises))
        .route(
            "/api/exercises/chapter/{chapter_id}",
            get(list_chapter_exercises),
        )
        .route(
            "/api/exercises/reorder/lesson/{lesson_id}",
            post(reorder_lesson_exercises),
        )
        .route(
            "/api/exercises/reorder/chapter/{chapter_id}",
            post(reorder_chapter_exercises),
        )
        .route(
            "/api/exercises/{exercise_id}",
            get(get_exercise).put(update_exercise).delete(delete_exercise),
        )
        .route(
            "/api/exercises/{exercise_id}/test-cases",
            get(list_test_cases),
        )
        .route("/api/exercises/test-cases", post(create_test_case))
        .route(
            "/api/exercises/test-cases/{test_case_id}",
            put(update_test_case).delete(delete_test_case),
        )
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(expose_metrics))
        .merge(api_routes())
        .with_state(state)
}

/// Registers metrics, binds `addr` and serves the API until the shutdown token fires.
pub async fn setup_server_with_addr(
    state: Arc<AppState>,
    addr: SocketAddr,
) -> Result<tokio::task::JoinHandle<()>, std::io::Error> {
    {
        let mut registry = state.registry.write().await;

        ORDERING_METRICS
            .get_or_init(|| async { OrderingMetrics::register(&mut registry, "ordering") })
            .await;

        monitoring::register_build_info_metric(&mut registry, "codepulse");
    }

    let shutdown_token = state.shutdown_token.clone();
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(event = "server_listening", %addr, "API server listening");
    let server_handle = tokio::spawn(async move {
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
        })
        .await;
        if let Err(err) = served {
            error!(event = "server_failed", error = %err, "API server stopped with an error");
        }
    });

    Ok(server_handle)
}
