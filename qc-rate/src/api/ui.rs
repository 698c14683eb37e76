//! Rating UI routes
//!
//! The browser's workflow state is looked up through the `qc_session`
//! cookie. Every handler writes the state back before returning, including
//! on errors, so a cleared or retained selection handle is not lost.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use qc_common::Step;
use serde::Deserialize;
use tracing::debug;

use crate::error::PageError;
use crate::forms::JudgmentForm;
use crate::html;
use crate::session::{cookie_value, session_cookie, SessionState, SESSION_COOKIE};
use crate::workflow::WorkflowError;
use crate::AppState;

const CLICKS_JS: &str = include_str!("../../ui/clicks.js");
const HOTKEYS_JS: &str = include_str!("../../ui/hotkeys.js");

#[derive(Debug, Deserialize)]
pub struct StartForm {
    pub step: String,
}

fn parse_step(raw: &str) -> Result<Step, PageError> {
    Step::from_slug(raw)
        .or_else(|| raw.parse().ok())
        .ok_or_else(|| PageError::UnknownStep(raw.to_string()))
}

/// Cookie token and workflow state for a step page
async fn load_session(state: &AppState, headers: &HeaderMap, step: Step) -> Result<(String, SessionState), PageError> {
    let token = cookie_value(headers, SESSION_COOKIE).ok_or(PageError::NoSession)?;
    match state.sessions.get(&token).await {
        Some(session) if session.step == step => Ok((token, session)),
        Some(session) => {
            debug!(session_id = session.session_id, "Session belongs to another step");
            Err(PageError::NoSession)
        }
        None => Err(PageError::NoSession),
    }
}

/// GET /
pub async fn index_page(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    let user = cookie_value(&headers, &state.settings.user_cookie);
    Html(html::index_page(user.as_deref()))
}

/// POST /
///
/// Starts a labeling session and sends the rater to the step page.
pub async fn start_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<StartForm>,
) -> Result<Response, PageError> {
    let step = parse_step(&form.step)?;
    let user = cookie_value(&headers, &state.settings.user_cookie);

    let session = state.workflow.start(step, user.as_deref()).await?;
    // Restarting from the same browser replaces its previous state
    if let Some(previous) = cookie_value(&headers, SESSION_COOKIE) {
        if let Some(old) = state.sessions.remove(&previous).await {
            debug!(session_id = old.session_id, "Replaced web session");
        }
    }
    let token = state.sessions.insert(session).await;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Redirect::to(&format!("/rate/{}", step.slug())),
    )
        .into_response())
}

/// GET /rate/{slug}
pub async fn rate_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let step = parse_step(&slug)?;
    let (token, mut session) = load_session(&state, &headers, step).await?;

    state.workflow.enter(&mut session);
    let shown = state.workflow.show(&mut session).await;
    state.sessions.put(&token, session).await;

    let image = shown?;
    Ok(Html(html::rate_page(step, &image, None)).into_response())
}

/// POST /rate/{slug}
///
/// Stores the judgment and renders the next image. An invalid submission
/// re-renders the same image with the validation message.
pub async fn submit_judgment(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Form(form): Form<JudgmentForm>,
) -> Result<Response, PageError> {
    let step = parse_step(&slug)?;
    let (token, mut session) = load_session(&state, &headers, step).await?;

    match state.workflow.submit(&mut session, &form).await {
        Ok(_) => {}
        Err(WorkflowError::InvalidSubmission(message)) => {
            return match state.workflow.current_image(&session).await? {
                Some(image) => Ok((
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Html(html::rate_page(step, &image, Some(&message))),
                )
                    .into_response()),
                None => Err(WorkflowError::InvalidSubmission(message).into()),
            };
        }
        Err(e) => return Err(e.into()),
    }

    let shown = state.workflow.show(&mut session).await;
    state.sessions.put(&token, session).await;

    let image = shown?;
    Ok(Html(html::rate_page(step, &image, None)).into_response())
}

/// GET /rate/{slug}/next
///
/// HTML partial with the next image and its form.
pub async fn next_image_partial(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<Response, PageError> {
    let step = parse_step(&slug)?;
    let (token, mut session) = load_session(&state, &headers, step).await?;

    let shown = state.workflow.show(&mut session).await;
    state.sessions.put(&token, session).await;

    let image = shown?;
    Ok(Html(html::image_fragment(step, &image, None)).into_response())
}

fn javascript(source: &'static str) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript")],
        source,
    )
        .into_response()
}

/// GET /static/clicks.js
pub async fn serve_clicks_js() -> Response {
    javascript(CLICKS_JS)
}

/// GET /static/hotkeys.js
pub async fn serve_hotkeys_js() -> Response {
    javascript(HOTKEYS_JS)
}
