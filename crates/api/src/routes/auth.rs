use crate::AppState;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use services::auth::{AuthRequest, CallbackOutcome, OAuthError, Platform};
use tracing::{debug, error};

/// Parameters the provider sends back to the callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

/// Parameters for starting a login
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub redirect: String,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub site: Option<String>,
}

/// OAuth callback, parameters in the query string
///
/// GET /oauth/{platform}?code=xxx&state=yyy
pub async fn oauth_callback_query(
    Path(platform): Path<String>,
    State(app_state): State<AppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => handle_callback(&app_state, &platform, params).await,
        Err(rejection) => rejection_response(rejection.status(), rejection.body_text()),
    }
}

/// OAuth callback, parameters in a form body (`response_mode=form_post`)
///
/// POST /oauth/{platform}
pub async fn oauth_callback_form(
    Path(platform): Path<String>,
    State(app_state): State<AppState>,
    params: Result<Form<CallbackParams>, FormRejection>,
) -> Response {
    match params {
        Ok(Form(params)) => handle_callback(&app_state, &platform, params).await,
        Err(rejection) => rejection_response(rejection.status(), rejection.body_text()),
    }
}

/// Redirect the browser to the provider's consent screen
///
/// GET /oauth/{platform}/authorize?redirect=..&backend=..&site=..
pub async fn authorize(
    Path(platform): Path<String>,
    State(app_state): State<AppState>,
    params: Result<Query<AuthorizeParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => return rejection_response(rejection.status(), rejection.body_text()),
    };

    let platform = match platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(e) => return not_found(&e),
    };

    match app_state
        .callback_service
        .authorize_url(platform, &params.redirect, &params.backend, params.site)
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            error!(%platform, error = %e, "Failed to build authorization URL");
            error_response(&e)
        }
    }
}

async fn handle_callback(app_state: &AppState, platform: &str, params: CallbackParams) -> Response {
    let platform = match platform.parse::<Platform>() {
        Ok(platform) => platform,
        Err(e) => return not_found(&e),
    };

    debug!(%platform, "OAuth callback received");

    let request = AuthRequest::new(params.code, params.state);
    match app_state
        .callback_service
        .handle_callback(platform, &request)
        .await
    {
        Ok(outcome) => render_success(platform, &outcome),
        Err(e) => error_response(&e),
    }
}

/// Web clients are redirected; native clients get a page that opens their URL scheme
pub fn render_success(platform: Platform, outcome: &CallbackOutcome) -> Response {
    let target = redirect_with_token(&outcome.redirect_url, &outcome.bearer_token);

    match platform {
        Platform::Web => Redirect::to(&target).into_response(),
        Platform::Desktop | Platform::Mobile => (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store")],
            Html(native_handoff_page(&target)),
        )
            .into_response(),
    }
}

/// Map an [`OAuthError`] to the JSON error body and status code
pub fn error_response(err: &OAuthError) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(serde_json::json!({
            "error": err.code(),
            "error_description": err.to_string(),
        })),
    )
        .into_response()
}

/// Extractor failures keep axum's status but use the JSON error body
fn rejection_response(status: StatusCode, description: String) -> Response {
    debug!(%status, %description, "Rejected callback request");
    (
        status,
        Json(serde_json::json!({
            "error": "invalid_request",
            "error_description": description,
        })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "error_description": message,
        })),
    )
        .into_response()
}

/// Append `token=<bearer>` to the redirect URL's query string
pub fn redirect_with_token(redirect_url: &str, token: &str) -> String {
    match url::Url::parse(redirect_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("token", token);
            url.to_string()
        }
        Err(_) => {
            // Relative targets are left to the browser to resolve
            let encoded: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
            let separator = if redirect_url.contains('?') { '&' } else { '?' };
            format!("{redirect_url}{separator}token={encoded}")
        }
    }
}

fn native_handoff_page(target: &str) -> String {
    let href = escape_html(target);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="0;url={href}">
<title>Signed in</title>
</head>
<body>
<p>You are signed in. Returning to the application...</p>
<p>If nothing happens, <a href="{href}">open the application</a>.</p>
</body>
</html>
"#
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
