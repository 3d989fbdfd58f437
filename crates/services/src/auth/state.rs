//! Decoding of the callback payload.
//!
//! The `state` parameter is built by the client before it starts the OAuth
//! dance and comes back untouched from the provider. It is a query string
//! (`redirect=..&backend=..&site=..`) that is itself percent-encoded once more,
//! so decoding takes two passes: unescape the blob, then parse it as a query.

use super::ports::{AuthRequest, OAuthDetails, OAuthError};
use config::DEFAULT_SITE;
use url::form_urlencoded;

const REDIRECT_KEY: &str = "redirect";
const BACKEND_KEY: &str = "backend";
const SITE_KEY: &str = "site";

/// Parse a callback request, defaulting the provider site to `google`
pub fn parse_state(request: &AuthRequest) -> Result<OAuthDetails, OAuthError> {
    parse_state_with_default(request, DEFAULT_SITE)
}

/// Parse a callback request into [`OAuthDetails`].
///
/// Checks run in a fixed order so every malformed request maps to exactly one
/// error: code, state, unescaping, query syntax, `redirect`, `backend`,
/// then the redirect's contents.
pub fn parse_state_with_default(
    request: &AuthRequest,
    default_site: &str,
) -> Result<OAuthDetails, OAuthError> {
    if request.code.is_empty() {
        return Err(OAuthError::MissingCode);
    }

    if request.encoded_state.is_empty() {
        return Err(OAuthError::MissingState);
    }

    let decoded_state = query_unescape(&request.encoded_state)
        .map_err(|e| OAuthError::MalformedState(format!("could not url decode state: {e}")))?;

    let params = parse_query(&decoded_state)
        .map_err(|e| OAuthError::MalformedState(format!("could not parse decoded state: {e}")))?;

    let redirect = first_value(&params, REDIRECT_KEY)
        .filter(|v| !v.is_empty())
        .ok_or(OAuthError::MissingRedirect)?;

    let backend = first_value(&params, BACKEND_KEY)
        .filter(|v| !v.is_empty())
        .ok_or(OAuthError::MissingBackend)?;

    // The redirect ends up in a Location header or an HTML attribute
    if redirect.chars().any(|c| c.is_control()) {
        return Err(OAuthError::MalformedState(
            "redirect URL contains control characters".to_string(),
        ));
    }

    // Only one trailing slash is removed; "https://api.example//" keeps one
    let backend_url = backend.strip_suffix('/').unwrap_or(backend);

    let site = first_value(&params, SITE_KEY)
        .filter(|v| !v.is_empty())
        .unwrap_or(default_site);

    Ok(OAuthDetails {
        code: request.code.clone(),
        redirect_url: redirect.to_string(),
        backend_url: backend_url.to_string(),
        site: site.to_string(),
    })
}

/// Build a state blob that [`parse_state`] decodes back into the same fields
pub fn encode_state(redirect: &str, backend: &str, site: Option<&str>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    serializer.append_pair(REDIRECT_KEY, redirect);
    serializer.append_pair(BACKEND_KEY, backend);
    if let Some(site) = site {
        serializer.append_pair(SITE_KEY, site);
    }

    urlencoding::encode(&serializer.finish()).into_owned()
}

/// Strict percent-decoding: `+` is a space, every `%` must start a valid escape
fn query_unescape(input: &str) -> Result<String, String> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid URL escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    urlencoding::decode(&input.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .map_err(|e| format!("invalid UTF-8 after decoding: {e}"))
}

/// Parse `k=v&k2=v2`, rejecting `;` separators and bad escapes in keys or values
fn parse_query(query: &str) -> Result<Vec<(String, String)>, String> {
    let mut params = Vec::new();

    for part in query.split('&') {
        if part.contains(';') {
            return Err("invalid semicolon separator in query".to_string());
        }
        if part.is_empty() {
            continue;
        }

        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.push((query_unescape(key)?, query_unescape(value)?));
    }

    Ok(params)
}

fn first_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(code: &str, state: &str) -> AuthRequest {
        AuthRequest::new(code, state)
    }

    #[test]
    fn test_parses_default_site_and_trims_backend() {
        let state = "redirect%3Dhttps%3A%2F%2Fapp.example%2Fcb%26backend%3Dhttps%3A%2F%2Fapi.example%2F";
        let details = parse_state(&request("abc123", state)).unwrap();

        assert_eq!(details.code, "abc123");
        assert_eq!(details.redirect_url, "https://app.example/cb");
        assert_eq!(details.backend_url, "https://api.example");
        assert_eq!(details.site, "google");
    }

    #[test]
    fn test_accepts_already_decoded_state() {
        // What the HTTP layer hands over after decoding the form once
        let state = "redirect=https://app.example/cb&backend=https://api.example&site=github";
        let details = parse_state(&request("abc", state)).unwrap();

        assert_eq!(details.backend_url, "https://api.example");
        assert_eq!(details.site, "github");
    }

    #[test]
    fn test_empty_site_uses_default() {
        let state = encode_state("https://app.example", "https://api.example", Some(""));
        let details = parse_state_with_default(&request("abc", &state), "github").unwrap();

        assert_eq!(details.site, "github");
    }

    #[test]
    fn test_only_one_trailing_slash_is_stripped() {
        let state = encode_state("https://app.example", "https://api.example//", None);
        let details = parse_state(&request("abc", &state)).unwrap();

        assert_eq!(details.backend_url, "https://api.example/");
    }

    #[test]
    fn test_encode_then_parse_is_lossless() {
        let redirect = "myapp://auth/done?next=/home&lang=en US+x";
        let backend = "https://api.example/v1";
        let state = encode_state(redirect, backend, Some("github"));
        let details = parse_state(&request("c", &state)).unwrap();

        assert_eq!(details.redirect_url, redirect);
        assert_eq!(details.backend_url, backend);
        assert_eq!(details.site, "github");
    }

    #[test]
    fn test_missing_code() {
        assert_eq!(
            parse_state(&request("", "redirect=a&backend=b")),
            Err(OAuthError::MissingCode)
        );
    }

    #[test]
    fn test_missing_state() {
        assert_eq!(parse_state(&request("abc", "")), Err(OAuthError::MissingState));
    }

    #[test]
    fn test_malformed_percent_encoding() {
        for state in ["redirect%3Da%26backend%3Db%ZZ", "redirect=a&backend=b%", "%4"] {
            let result = parse_state(&request("abc", state));
            assert!(
                matches!(result, Err(OAuthError::MalformedState(_))),
                "state {state:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_malformed_query_syntax() {
        // The outer pass turns %25zz into %zz, which the inner pass rejects
        for state in ["redirect=a;backend=b", "redirect%3Da%25zz%26backend%3Db"] {
            let result = parse_state(&request("abc", state));
            assert!(
                matches!(result, Err(OAuthError::MalformedState(_))),
                "state {state:?} gave {result:?}"
            );
        }
    }

    #[test]
    fn test_missing_redirect() {
        assert_eq!(
            parse_state(&request("abc", "backend%3Dhttps%3A%2F%2Fapi.example")),
            Err(OAuthError::MissingRedirect)
        );
        assert_eq!(
            parse_state(&request("abc", "redirect=&backend=https://api.example")),
            Err(OAuthError::MissingRedirect)
        );
    }

    #[test]
    fn test_missing_backend() {
        assert_eq!(
            parse_state(&request("abc", "redirect%3Dhttps%3A%2F%2Fapp.example%2Fcb")),
            Err(OAuthError::MissingBackend)
        );
    }

    #[test]
    fn test_redirect_with_control_characters_is_malformed() {
        for redirect in ["/done\u{1}", "https://app.example/cb\r\nSet-Cookie: x=1", "/a\u{7f}"] {
            let state = encode_state(redirect, "https://api.example", None);
            let result = parse_state(&request("abc", &state));
            assert!(
                matches!(result, Err(OAuthError::MalformedState(_))),
                "redirect {redirect:?} gave {result:?}"
            );
        }

        // Missing backend still wins over a bad redirect
        let state = encode_state("/done\u{1}", "", None);
        assert_eq!(
            parse_state(&request("abc", &state)),
            Err(OAuthError::MissingBackend)
        );
    }

    #[test]
    fn test_first_value_wins_for_repeated_keys() {
        let state = "redirect=https://first.example&redirect=https://second.example&backend=https://api.example";
        let details = parse_state(&request("abc", state)).unwrap();

        assert_eq!(details.redirect_url, "https://first.example");
    }

    #[test]
    fn test_query_unescape() {
        assert_eq!(query_unescape("a%20b+c").unwrap(), "a b c");
        assert_eq!(query_unescape("%2B").unwrap(), "+");
        assert!(query_unescape("%").is_err());
        assert!(query_unescape("%ff").is_err()); // not UTF-8 on its own
    }
}
