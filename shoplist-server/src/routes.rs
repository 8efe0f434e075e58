//! HTTP handlers for the review page.
//!
//! Each handler performs at most one state machine operation on the
//! caller's session and then re-renders. Browsers are redirected back to
//! the page; other clients get the new state as JSON.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use shoplist_core::{Event, Outcome, ReviewView};
use tracing::{info, warn};

use crate::mailer::{send_list, NotifyResult};
use crate::page::{render_review_page, Features};
use crate::session::{ClientSession, Notice, SessionId, SharedSession};
use crate::voice::spawn_voice_worker;
use crate::AppState;

pub const SESSION_COOKIE: &str = "shoplist_session";

/// Session state as seen by JSON clients.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub view: ReviewView,
    pub notice: Option<Notice>,
    pub voice_active: bool,
}

impl SessionSnapshot {
    fn of(session: &ClientSession, notice: Option<Notice>) -> Self {
        Self {
            view: ReviewView::from_session(&session.review),
            notice,
            voice_active: session.voice_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmForm {
    #[serde(default)]
    pub quantity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotifyForm {
    #[serde(default)]
    pub recipient: Option<String>,
}

pub fn review_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(review_page))
        .route("/review/confirm", post(confirm_handler))
        .route("/review/skip", post(skip_handler))
        .route("/review/reset", post(reset_handler))
        .route("/notify", post(notify_handler))
        .route("/voice/start", post(voice_start_handler))
        .route("/session/end", post(end_session_handler))
}

/// Returns true if the client prefers HTML (case-insensitive check).
fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.to_lowercase().contains("text/html"))
        .unwrap_or(false)
}

fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.0.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn cookie_session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| SessionId::parse(cookie.value()))
}

/// Find the caller's session, starting one on first visit.
async fn client_session(
    state: &AppState,
    jar: CookieJar,
) -> (CookieJar, SessionId, SharedSession) {
    let existing = cookie_session_id(&jar);
    let (id, session) = state.sessions.get_or_create(existing.clone()).await;
    let jar = if existing.as_ref() == Some(&id) {
        jar
    } else {
        jar.add(session_cookie(&id))
    };
    (jar, id, session)
}

/// Find the caller's session without starting one. Only `GET /` does that.
async fn existing_session(
    state: &AppState,
    jar: &CookieJar,
) -> Option<(SessionId, SharedSession)> {
    let id = cookie_session_id(jar)?;
    let session = state.sessions.resume(&id).await?;
    Some((id, session))
}

/// Answer an action from a client with no live session.
fn no_session(headers: &HeaderMap) -> Response {
    if wants_html(headers) {
        return Redirect::to("/").into_response();
    }
    (StatusCode::NOT_FOUND, "No review session; load / to start one").into_response()
}

/// Treat an empty picker as "no quantity chosen".
pub fn parse_quantity(raw: Option<&str>) -> Result<Option<u32>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<u32>()
            .map(Some)
            .map_err(|_| format!("`{}` is not a whole number", value)),
    }
}

/// Handler: GET /
///
/// Renders the review page, or the session state as JSON.
async fn review_page(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    let (jar, _id, session) = client_session(&state, jar).await;
    let mut session = session.lock().await;
    let notice = session.take_notice();

    if wants_html(&headers) {
        let view = ReviewView::from_session(&session.review);
        let html = render_review_page(
            &state.page,
            &view,
            notice.as_ref(),
            Features {
                recipients: state
                    .mailer
                    .as_ref()
                    .map(|_| state.recipients.as_ref().map(|r| r.choices()).unwrap_or(&[])),
                voice: state.voice.is_some(),
                voice_active: session.voice_active,
            },
        );
        return (jar, Html(html)).into_response();
    }

    (jar, Json(SessionSnapshot::of(&session, notice))).into_response()
}

/// Apply one event to the caller's session and answer the client.
async fn apply_event(
    state: &AppState,
    headers: &HeaderMap,
    jar: CookieJar,
    event: Event,
) -> Response {
    let Some((id, session)) = existing_session(state, &jar).await else {
        return no_session(headers);
    };
    let mut session = session.lock().await;
    let outcome = session.apply(&id, event);

    let (status, notice) = match outcome {
        Outcome::Rejected(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(Notice::error(err.to_string())),
        ),
        _ => (StatusCode::OK, None),
    };

    if wants_html(headers) {
        session.notice = notice;
        return (jar, Redirect::to("/")).into_response();
    }
    (jar, (status, Json(SessionSnapshot::of(&session, notice)))).into_response()
}

/// Handler: POST /review/confirm
async fn confirm_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
    Form(form): Form<ConfirmForm>,
) -> Response {
    let quantity = match parse_quantity(form.quantity.as_deref()) {
        Ok(quantity) => quantity,
        Err(message) => {
            warn!("Rejected confirm with unparseable quantity: {}", message);
            return (StatusCode::BAD_REQUEST, message).into_response();
        }
    };
    apply_event(&state, &headers, jar, Event::Confirm { quantity }).await
}

/// Handler: POST /review/skip
async fn skip_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    apply_event(&state, &headers, jar, Event::Skip).await
}

/// Handler: POST /review/reset
///
/// Not found when the reset control is turned off.
async fn reset_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !state.page.reset_enabled {
        return (StatusCode::NOT_FOUND, "Reset is disabled").into_response();
    }
    apply_event(&state, &headers, jar, Event::Reset).await
}

/// Handler: POST /notify
///
/// Emails the current selections. The session is not locked while the
/// transport is sending.
async fn notify_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
    Form(form): Form<NotifyForm>,
) -> Response {
    let Some((id, session)) = existing_session(&state, &jar).await else {
        return no_session(&headers);
    };
    let selections = session.lock().await.review.selections().to_vec();

    let result = send_list(
        state.mailer.as_deref(),
        state.recipients.as_ref(),
        &selections,
        form.recipient.as_deref(),
    )
    .await;
    info!("Notify for session {}: {}", id, result.message());

    let status = match &result {
        NotifyResult::Sent { .. } => StatusCode::OK,
        NotifyResult::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        NotifyResult::Failed { .. } => StatusCode::BAD_GATEWAY,
    };

    if wants_html(&headers) {
        let notice = if result.is_sent() {
            Notice::success(result.message())
        } else {
            Notice::error(result.message())
        };
        session.lock().await.notice = Some(notice);
        return (jar, Redirect::to("/")).into_response();
    }
    (jar, (status, Json(result))).into_response()
}

#[derive(Debug, Serialize)]
struct VoiceStartResponse {
    started: bool,
    message: String,
}

/// Handler: POST /voice/start
async fn voice_start_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(voice) = state.voice.as_ref() else {
        return (StatusCode::NOT_FOUND, "Voice review is disabled").into_response();
    };
    let Some((id, session)) = existing_session(&state, &jar).await else {
        return no_session(&headers);
    };

    let (status, response) = match spawn_voice_worker(
        id.clone(),
        session.clone(),
        voice.intents.clone(),
        voice.backend.clone(),
    )
    .await
    {
        // The worker runs detached; it clears `voice_active` when it stops.
        Ok(Some(_handle)) => (
            StatusCode::ACCEPTED,
            VoiceStartResponse {
                started: true,
                message: "Listening for answers.".to_string(),
            },
        ),
        Ok(None) => (
            StatusCode::OK,
            VoiceStartResponse {
                started: false,
                message: "Voice review is already running.".to_string(),
            },
        ),
        Err(e) => {
            warn!("Failed to start voice review for session {}: {:#}", id, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                VoiceStartResponse {
                    started: false,
                    message: format!("Could not start voice review: {:#}", e),
                },
            )
        }
    };

    if wants_html(&headers) {
        if status == StatusCode::SERVICE_UNAVAILABLE {
            session.lock().await.notice = Some(Notice::error(response.message));
        }
        return (jar, Redirect::to("/")).into_response();
    }
    (jar, (status, Json(response))).into_response()
}

/// Handler: POST /session/end
///
/// Tears down the caller's session and forgets the cookie.
async fn end_session_handler(
    headers: HeaderMap,
    jar: CookieJar,
    State(state): State<Arc<AppState>>,
) -> Response {
    if let Some(id) = cookie_session_id(&jar) {
        state.sessions.remove(&id).await;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    if wants_html(&headers) {
        return (jar, Redirect::to("/")).into_response();
    }
    (jar, StatusCode::NO_CONTENT).into_response()
}
