//! Synthetic responses served when neither network nor cache can answer.

use kindred_net::Response;
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::OfflineMessages;

/// Error tag the page special-cases together with status 503.
pub const OFFLINE_ERROR: &str = "Offline";

/// 503 JSON body `{error: "Offline", message, ...}` for an API path.
///
/// Known endpoints carry an empty default payload so list views render
/// an empty state instead of failing.
pub fn offline_api_response(url: &Url, messages: &OfflineMessages) -> Response {
    let path = url.path();
    let (message, payload) = if path.starts_with("/api/matches") {
        (&messages.matches, Some(("matches", json!([]))))
    } else if path.starts_with("/api/profile") {
        (&messages.profile, Some(("profile", Value::Null)))
    } else if path.starts_with("/api/feed") {
        (&messages.feed, Some(("cards", json!([]))))
    } else {
        (&messages.generic, None)
    };

    let mut body = Map::new();
    body.insert("error".to_string(), Value::from(OFFLINE_ERROR));
    body.insert("message".to_string(), Value::from(message.as_str()));
    if let Some((field, value)) = payload {
        body.insert(field.to_string(), value);
    }

    Response::offline_json(url.clone(), &Value::Object(body))
}

/// Self-contained 503 HTML page with a reload button.
pub fn offline_page(url: &Url, messages: &OfflineMessages) -> Response {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #fff5f7; color: #333; }}
main {{ text-align: center; padding: 2rem; }}
button {{ margin-top: 1rem; padding: 0.75rem 2rem; border: 0; border-radius: 999px; background: #e63e6d; color: #fff; font-size: 1rem; cursor: pointer; }}
</style>
</head>
<body>
<main>
<h1>{heading}</h1>
<p>{body}</p>
<button type="button" onclick="window.location.reload()">{reload}</button>
</main>
</body>
</html>
"#,
        title = escape_html(&messages.page_title),
        heading = escape_html(&messages.page_heading),
        body = escape_html(&messages.page_body),
        reload = escape_html(&messages.reload_label),
    );
    Response::offline_html(url.clone(), html)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_matches_payload() {
        let response = offline_api_response(&url("https://kindred.app/api/matches"), &OfflineMessages::default());
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        let body: Value = response.json().unwrap();
        assert_eq!(body["error"], "Offline");
        assert_eq!(body["message"], OfflineMessages::default().matches);
        assert_eq!(body["matches"], json!([]));
    }

    #[test]
    fn test_profile_and_generic_payloads() {
        let messages = OfflineMessages::default();

        let profile: Value = offline_api_response(&url("https://kindred.app/api/profile"), &messages)
            .json()
            .unwrap();
        assert!(profile["profile"].is_null());
        assert_eq!(profile["message"], messages.profile);

        let other: Value = offline_api_response(&url("https://kindred.app/api/auth/me"), &messages)
            .json()
            .unwrap();
        assert_eq!(other["message"], messages.generic);
        assert!(other.get("matches").is_none());
    }

    #[test]
    fn test_offline_page_has_reload_control() {
        let messages = OfflineMessages {
            page_heading: "<Offline & alone>".to_string(),
            ..Default::default()
        };
        let response = offline_page(&url("https://kindred.app/matches"), &messages);
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.content_type().unwrap().essence_str(), "text/html");

        let html = response.text().unwrap();
        assert!(html.contains("window.location.reload()"));
        assert!(html.contains("&lt;Offline &amp; alone&gt;"));
    }
}
