//! HTTP surface of the registry: thin handlers over [`Registry`], one per
//! route. All responses are JSON; errors carry an `error` field and the
//! status class of the underlying error kind.

use crate::config::Listener as ListenerConfig;
use crate::error::Error;
use crate::model::{Project, Test};
use crate::service::{NewProject, NewTest, ProjectUpdate, Registry, TestUpdate};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub async fn serve(listener: ListenerConfig, registry: Registry) -> Result<(), ApiError> {
    let app = router(registry);

    let addr = format!("{}:{}", listener.host, listener.port);
    tracing::info!(%addr, "bucket registry listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Builds the full route table. Collection paths are registered with and
/// without the trailing slash; existing clients use both forms.
pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/healthcheck.html", get(healthcheck))
        .route("/projects", get(list_projects).post(create_project))
        .route("/projects/", get(list_projects).post(create_project))
        .route("/projects/search/{field}", get(search_projects))
        .route(
            "/projects/{project}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/{project}/tests",
            get(list_tests).post(create_test),
        )
        .route(
            "/projects/{project}/tests/",
            get(list_tests).post(create_test),
        )
        .route("/projects/{project}/tests/search/{field}", get(search_tests))
        .route(
            "/projects/{project}/tests/{uuid}",
            get(get_test).put(update_test).delete(delete_test),
        )
        .with_state(registry)
}

#[derive(Serialize)]
struct ProjectsResponse {
    projects: Vec<Project>,
}

#[derive(Serialize)]
struct ProjectResponse {
    project: Project,
}

#[derive(Serialize)]
struct TestsResponse {
    tests: Vec<Test>,
}

#[derive(Serialize)]
struct TestResponse {
    test: Test,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    host: String,
}

#[derive(Deserialize, Debug)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ApiErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "pageok",
        host: gethostname::gethostname().to_string_lossy().into_owned(),
    })
}

async fn list_projects(State(registry): State<Registry>) -> Json<ProjectsResponse> {
    Json(ProjectsResponse {
        projects: registry.projects(),
    })
}

async fn get_project(
    State(registry): State<Registry>,
    Path(project): Path<String>,
) -> Result<Json<ProjectResponse>, Error> {
    registry
        .project(&project)
        .map(|project| Json(ProjectResponse { project }))
}

async fn create_project(
    State(registry): State<Registry>,
    Json(request): Json<NewProject>,
) -> Result<(StatusCode, Json<ProjectResponse>), Error> {
    let project = registry.create_project(request)?;
    Ok((StatusCode::CREATED, Json(ProjectResponse { project })))
}

async fn update_project(
    State(registry): State<Registry>,
    Path(project): Path<String>,
    Json(request): Json<ProjectUpdate>,
) -> Result<Json<ProjectResponse>, Error> {
    registry
        .update_project(&project, request)
        .map(|project| Json(ProjectResponse { project }))
}

async fn delete_project(
    State(registry): State<Registry>,
    Path(project): Path<String>,
) -> Result<Json<MessageResponse>, Error> {
    registry.delete_project(&project)?;
    Ok(Json(MessageResponse {
        message: "Project successfully deleted.",
    }))
}

async fn search_projects(
    State(registry): State<Registry>,
    Path(field): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ProjectsResponse>, Error> {
    registry
        .search_projects(&field, &params.q)
        .map(|projects| Json(ProjectsResponse { projects }))
}

async fn list_tests(
    State(registry): State<Registry>,
    Path(project): Path<String>,
) -> Json<TestsResponse> {
    Json(TestsResponse {
        tests: registry.tests(&project),
    })
}

async fn search_tests(
    State(registry): State<Registry>,
    Path((project, field)): Path<(String, String)>,
    Query(params): Query<SearchParams>,
) -> Result<Json<TestsResponse>, Error> {
    registry
        .search_tests(&project, &field, &params.q)
        .map(|tests| Json(TestsResponse { tests }))
}

async fn get_test(
    State(registry): State<Registry>,
    Path((project, uuid)): Path<(String, String)>,
) -> Result<Json<TestResponse>, Error> {
    registry
        .test(&project, &uuid)
        .map(|test| Json(TestResponse { test }))
}

async fn create_test(
    State(registry): State<Registry>,
    Path(project): Path<String>,
    Json(request): Json<NewTest>,
) -> Result<(StatusCode, Json<TestResponse>), Error> {
    let test = registry.create_test(&project, request)?;
    Ok((StatusCode::CREATED, Json(TestResponse { test })))
}

async fn update_test(
    State(registry): State<Registry>,
    Path((project, uuid)): Path<(String, String)>,
    Json(request): Json<TestUpdate>,
) -> Result<Json<TestResponse>, Error> {
    registry
        .update_test(&project, &uuid, request)
        .map(|test| Json(TestResponse { test }))
}

async fn delete_test(
    State(registry): State<Registry>,
    Path((project, uuid)): Path<(String, String)>,
) -> Result<Json<MessageResponse>, Error> {
    registry.delete_test(&project, &uuid)?;
    Ok(Json(MessageResponse {
        message: "Test successfully deleted.",
    }))
}
