use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicantRef, ApplicationId, ApplicationView, ApproverRef, ReviewMessageRef, VoteDecision,
};
use super::notifier::Notifier;
use super::service::{ReviewError, ReviewService};
use super::votes::VoteError;
use crate::config::Feature;
use crate::workflows::intake::IntakeImportError;

/// Router builder exposing intake, voting and history endpoints.
pub fn review_router<N>(service: Arc<ReviewService<N>>) -> Router
where
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<N>).get(list_handler::<N>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(status_handler::<N>),
        )
        .route(
            "/api/v1/applications/:application_id/votes",
            post(vote_handler::<N>),
        )
        .route(
            "/api/v1/applications/:application_id/review-message",
            put(link_message_handler::<N>),
        )
        .route("/api/v1/reviews/reactions", post(reaction_handler::<N>))
        .route("/api/v1/reviews/replies", post(reply_handler::<N>))
        .route(
            "/api/v1/applicants/:applicant/history",
            get(history_handler::<N>),
        )
        .route("/api/v1/intake/spreadsheet", post(spreadsheet_handler::<N>))
        .route(
            "/api/v1/settings/features",
            get(features_handler::<N>).put(set_feature_handler::<N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) applicant: Option<String>,
    #[serde(default)]
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    pub(crate) status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VoteRequest {
    pub(crate) approver: String,
    pub(crate) decision: VoteDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LinkMessageRequest {
    pub(crate) message_ref: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReactionRequest {
    pub(crate) message_ref: String,
    pub(crate) approver: String,
    pub(crate) emoji: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyRequest {
    pub(crate) message_ref: String,
    pub(crate) approver: String,
    pub(crate) text: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureRequest {
    pub(crate) feature: Feature,
    pub(crate) enabled: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({ "error": message.into() });
    (status, axum::Json(payload)).into_response()
}

fn parse_id(raw: &str) -> Result<ApplicationId, Response> {
    raw.parse::<ApplicationId>()
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, err.to_string()))
}

fn review_error_response(error: ReviewError) -> Response {
    match error {
        ReviewError::NotFound(_) | ReviewError::Vote(VoteError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, error.to_string())
        }
        ReviewError::ApprovalsDisabled => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, error.to_string())
        }
        ReviewError::Vote(other) => error_response(StatusCode::CONFLICT, other.to_string()),
        ReviewError::Settings(_) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
        }
    }
}

pub(crate) async fn submit_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    if request.kind.trim().is_empty() {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, "kind must not be empty");
    }

    let applicant = request.applicant.and_then(ApplicantRef::resolved);
    match service.submit(request.kind.trim(), applicant, request.content) {
        Ok(application) => (StatusCode::ACCEPTED, axum::Json(application.view())).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn list_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    N: Notifier + 'static,
{
    let filter = query
        .status
        .as_deref()
        .map(|status| status.trim().to_ascii_lowercase());

    let applications = match filter.as_deref() {
        None | Some("") | Some("all") => service.all(),
        Some("pending") => service.pending(),
        Some(status @ ("approved" | "denied")) => service
            .all()
            .into_iter()
            .filter(|application| application.status.label() == status)
            .collect(),
        Some(other) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("unknown status filter '{other}'"),
            )
        }
    };

    let views: Vec<ApplicationView> = applications.iter().map(|app| app.view()).collect();
    (StatusCode::OK, axum::Json(views)).into_response()
}

pub(crate) async fn status_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    N: Notifier + 'static,
{
    let id = match parse_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.get(id) {
        Ok(application) => (StatusCode::OK, axum::Json(application.view())).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn vote_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<VoteRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    let id = match parse_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.cast_vote(id, ApproverRef(request.approver), request.decision) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(err) if err.is_benign() => {
            let payload = json!({ "ignored": err.reason() });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => review_error_response(ReviewError::Vote(err)),
    }
}

pub(crate) async fn link_message_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<LinkMessageRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    let id = match parse_id(&application_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match service.link_review_message(id, ReviewMessageRef(request.message_ref)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn reaction_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    axum::Json(request): axum::Json<ReactionRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    let message = ReviewMessageRef(request.message_ref);
    match service.vote_via_reaction(&message, ApproverRef(request.approver), &request.emoji) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn reply_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    axum::Json(request): axum::Json<ReplyRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    let message = ReviewMessageRef(request.message_ref);
    match service.vote_via_reply(&message, ApproverRef(request.approver), &request.text) {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub(crate) async fn history_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    Path(applicant): Path<String>,
) -> Response
where
    N: Notifier + 'static,
{
    let Some(applicant) = ApplicantRef::resolved(applicant) else {
        return error_response(StatusCode::BAD_REQUEST, "applicant must not be empty");
    };
    let views: Vec<ApplicationView> = service
        .history(&applicant)
        .iter()
        .map(|application| application.view())
        .collect();
    (StatusCode::OK, axum::Json(views)).into_response()
}

pub(crate) async fn spreadsheet_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    body: String,
) -> Response
where
    N: Notifier + 'static,
{
    match service.import_spreadsheet(Cursor::new(body.into_bytes())) {
        Ok(summary) => (StatusCode::ACCEPTED, axum::Json(summary)).into_response(),
        Err(IntakeImportError::Csv(err)) => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        Err(IntakeImportError::Review(err)) => review_error_response(err),
        Err(other) => error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

pub(crate) async fn features_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
) -> Response
where
    N: Notifier + 'static,
{
    (StatusCode::OK, axum::Json(service.features())).into_response()
}

pub(crate) async fn set_feature_handler<N>(
    State(service): State<Arc<ReviewService<N>>>,
    axum::Json(request): axum::Json<FeatureRequest>,
) -> Response
where
    N: Notifier + 'static,
{
    match service.set_feature(request.feature, request.enabled) {
        Ok(toggles) => (StatusCode::OK, axum::Json(toggles)).into_response(),
        Err(err) => review_error_response(err),
    }
}
