//! Login page inspection.
//!
//! Everything here is synchronous and returns owned data: `scraper::Html`
//! is not `Send`, so documents are parsed and dropped before the
//! authenticator awaits anything.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::cookies::domain_matches;
use super::credentials::Credential;
use super::error::AuthError;

/// Login page path, relative to the site origin
pub const LOGIN_PATH: &str = "ucp.php?mode=login";

/// Status endpoint used to probe whether a session is still accepted
pub const STATUS_PATH: &str = "api3.php?do=status";

/// Text present on the landing page only when the visitor is not logged in
pub const LOGIN_REQUIRED_MARKERS: &[&str] =
    &["Login Required", "Login with Zwift", "Sign in with Zwift"];

/// OAuth anchor patterns, most specific first. The first match wins.
pub const DEFAULT_OAUTH_SELECTORS: &[&str] = &[
    r#"a.button[href*="id.zwift.com"]"#,
    r#"a[href*="id.zwift.com"]"#,
    r#"a[href*="zwift.com/auth"]"#,
    r#"a.btn[href*="zwift"]"#,
    r#"a[href*="openid-connect"]"#,
];

const INVALID_CREDENTIAL_MARKERS: &[&str] = &["Invalid username", "Invalid password"];

/// Form id of the site's own login form
const DIRECT_FORM_ID: &str = "login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthAnchor {
    /// The selector pattern that matched
    pub selector: String,
    pub href: String,
}

/// True while the page still asks the visitor to log in
pub fn requires_login(body: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| body.contains(marker.as_str()))
}

/// Try each selector in order and return the first anchor with an href.
/// Patterns that fail to parse are skipped.
pub fn find_oauth_anchor(body: &str, selectors: &[String]) -> Option<OAuthAnchor> {
    let document = Html::parse_document(body);
    for pattern in selectors {
        let selector = match Selector::parse(pattern) {
            Ok(selector) => selector,
            Err(e) => {
                warn!(selector = %pattern, error = ?e, "Skipping invalid OAuth selector");
                continue;
            }
        };
        let found = document
            .select(&selector)
            .find_map(|element| element.value().attr("href"));
        if let Some(href) = found {
            debug!(selector = %pattern, "Found OAuth login anchor");
            return Some(OAuthAnchor {
                selector: pattern.clone(),
                href: href.to_string(),
            });
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInput {
    pub name: String,
    /// Lowercased `type` attribute, `text` when absent
    pub input_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub action: String,
    pub inputs: Vec<FormInput>,
}

impl LoginForm {
    /// Absolute submit URL, resolved against the page the form came from
    pub fn action_url(&self, page_url: &Url) -> Result<Url, AuthError> {
        page_url
            .join(&self.action)
            .map_err(|e| AuthError::LoginFailed(format!("Invalid form action: {}", e)))
    }

    /// Fields for the identity provider form: identity and secret go into
    /// the inputs that look like them, everything else keeps its default.
    pub fn oauth_fields(&self, credential: &Credential) -> Vec<(String, String)> {
        self.inputs
            .iter()
            .map(|input| {
                let name = input.name.to_ascii_lowercase();
                let value = if input.input_type == "email" || name == "email" || name == "username" {
                    credential.identity().to_string()
                } else if input.input_type == "password" || name == "password" {
                    credential.secret().to_string()
                } else {
                    input.value.clone()
                };
                (input.name.clone(), value)
            })
            .collect()
    }

    /// Fields for the site's own form: every default copied, then the
    /// credential and submit fields overwritten.
    pub fn direct_fields(&self, credential: &Credential) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .inputs
            .iter()
            .map(|input| (input.name.clone(), input.value.clone()))
            .collect();
        upsert(&mut fields, "username", credential.identity());
        upsert(&mut fields, "password", credential.secret());
        upsert(&mut fields, "login", "Login");
        fields
    }
}

fn upsert(fields: &mut Vec<(String, String)>, name: &str, value: &str) {
    match fields.iter_mut().find(|(existing, _)| existing == name) {
        Some((_, slot)) => *slot = value.to_string(),
        None => fields.push((name.to_string(), value.to_string())),
    }
}

/// Find a form, preferring the one with `preferred_id`, else the first.
/// Unnamed inputs are ignored.
pub fn find_form(body: &str, preferred_id: Option<&str>) -> Option<LoginForm> {
    let document = Html::parse_document(body);
    let any_form = Selector::parse("form").ok()?;
    let input_selector = Selector::parse("input").ok()?;

    let form = preferred_id
        .and_then(|id| Selector::parse(&format!("form#{}", id)).ok())
        .and_then(|selector| document.select(&selector).next())
        .or_else(|| document.select(&any_form).next())?;

    let inputs = form
        .select(&input_selector)
        .filter_map(|input| {
            let attrs = input.value();
            let name = attrs.attr("name").filter(|n| !n.is_empty())?;
            Some(FormInput {
                name: name.to_string(),
                input_type: attrs.attr("type").unwrap_or("text").to_ascii_lowercase(),
                value: attrs.attr("value").unwrap_or_default().to_string(),
            })
        })
        .collect();

    Some(LoginForm {
        action: form.value().attr("action").unwrap_or_default().to_string(),
        inputs,
    })
}

/// Find the site's own login form (`form#login`, else the first form)
pub fn find_direct_form(body: &str) -> Option<LoginForm> {
    find_form(body, Some(DIRECT_FORM_ID))
}

/// The OAuth flow succeeded when it lands back on the origin host or one of
/// its subdomains and the final URL carries no error token.
pub fn oauth_succeeded(final_url: &Url, origin: &Url) -> bool {
    let on_origin = match (final_url.host_str(), origin.host_str()) {
        (Some(host), Some(origin_host)) => domain_matches(host, origin_host, false),
        _ => false,
    };
    on_origin && !final_url.as_str().to_ascii_lowercase().contains("error")
}

/// Judge the response to a direct form submission.
pub fn check_direct_login(body: &str, final_url: &Url) -> Result<(), AuthError> {
    if INVALID_CREDENTIAL_MARKERS
        .iter()
        .any(|marker| body.contains(marker))
    {
        return Err(AuthError::InvalidCredentials);
    }
    // Weak heuristic: anything that moved us off the login URL counts as success
    if final_url.as_str().contains(LOGIN_PATH) {
        return Err(AuthError::LoginFailed(
            "Direct login failed - still on login page".to_string(),
        ));
    }
    Ok(())
}

pub fn default_markers() -> Vec<String> {
    LOGIN_REQUIRED_MARKERS.iter().map(|s| s.to_string()).collect()
}

pub fn default_selectors() -> Vec<String> {
    DEFAULT_OAUTH_SELECTORS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid test url")
    }

    #[test]
    fn test_requires_login() {
        let markers = default_markers();
        assert!(requires_login("<h1>Login Required</h1>", &markers));
        assert!(requires_login("<a>Sign in with Zwift</a>", &markers));
        assert!(!requires_login("<h1>Welcome back</h1>", &markers));
    }

    #[test]
    fn test_selector_priority_first_match_wins() {
        // Both anchors match some selector; the button pattern is listed first
        let html = r#"
            <a href="https://zwift.com/auth/start">generic</a>
            <a class="button" href="https://id.zwift.com/login?x=1">button</a>
        "#;
        let anchor = find_oauth_anchor(html, &default_selectors()).expect("anchor");
        assert_eq!(anchor.href, "https://id.zwift.com/login?x=1");
        assert_eq!(anchor.selector, DEFAULT_OAUTH_SELECTORS[0]);
    }

    #[test]
    fn test_selector_order_is_configurable() {
        let html = r#"
            <a class="button" href="https://id.zwift.com/login">button</a>
            <a href="/openid-connect/start">oidc</a>
        "#;
        let selectors = vec![
            r#"a[href*="openid-connect"]"#.to_string(),
            r#"a[href*="id.zwift.com"]"#.to_string(),
        ];
        let anchor = find_oauth_anchor(html, &selectors).expect("anchor");
        assert_eq!(anchor.href, "/openid-connect/start");
    }

    #[test]
    fn test_invalid_selector_is_skipped() {
        let html = r#"<a href="https://id.zwift.com/login">go</a>"#;
        let selectors = vec!["a[[[".to_string(), r#"a[href*="id.zwift.com"]"#.to_string()];
        assert!(find_oauth_anchor(html, &selectors).is_some());
    }

    #[test]
    fn test_no_anchor() {
        let html = r#"<form id="login"><input name="username"></form>"#;
        assert!(find_oauth_anchor(html, &default_selectors()).is_none());
    }

    #[test]
    fn test_oauth_field_mapping() {
        let html = r#"
            <form action="/auth/submit">
              <input type="email" name="login_id">
              <input type="password" name="pw">
              <input type="hidden" name="csrf" value="tok123">
              <input name="username">
              <input type="submit" value="Go">
            </form>
        "#;
        let form = find_form(html, None).expect("form");
        let credential = Credential::new("rider@example.com", "hunter2");
        let fields = form.oauth_fields(&credential);

        assert_eq!(
            fields,
            vec![
                ("login_id".to_string(), "rider@example.com".to_string()),
                ("pw".to_string(), "hunter2".to_string()),
                ("csrf".to_string(), "tok123".to_string()),
                ("username".to_string(), "rider@example.com".to_string()),
            ]
        );
        let action = form
            .action_url(&url("https://id.zwift.com/login/page"))
            .expect("action");
        assert_eq!(action.as_str(), "https://id.zwift.com/auth/submit");
    }

    #[test]
    fn test_empty_action_resolves_to_page() {
        let form = find_form("<form><input name='a' value='b'></form>", None).expect("form");
        let action = form.action_url(&url("https://id.zwift.com/login?s=1")).expect("action");
        assert_eq!(action.as_str(), "https://id.zwift.com/login?s=1");
    }

    #[test]
    fn test_direct_form_prefers_login_id_and_overwrites() {
        let html = r#"
            <form id="search"><input name="q" value="x"></form>
            <form id="login" method="post">
              <input type="hidden" name="sid" value="abc">
              <input type="text" name="username" value="">
              <input type="password" name="password">
              <input type="submit" name="login" value="Submit">
            </form>
        "#;
        let form = find_direct_form(html).expect("form");
        let fields = form.direct_fields(&Credential::new("rider", "pw"));
        assert_eq!(
            fields,
            vec![
                ("sid".to_string(), "abc".to_string()),
                ("username".to_string(), "rider".to_string()),
                ("password".to_string(), "pw".to_string()),
                ("login".to_string(), "Login".to_string()),
            ]
        );
    }

    #[test]
    fn test_oauth_success_judgment() {
        let origin = url("https://zwiftpower.com");
        assert!(oauth_succeeded(&url("https://zwiftpower.com/events.php"), &origin));
        assert!(!oauth_succeeded(&url("https://zwiftpower.com/?error=denied"), &origin));
        assert!(!oauth_succeeded(&url("https://id.zwift.com/login"), &origin));

        assert!(oauth_succeeded(&url("https://www.zwiftpower.com/events.php"), &origin));
        assert!(!oauth_succeeded(&url("https://www.zwiftpower.com/?error=1"), &origin));
        assert!(!oauth_succeeded(&url("https://evilzwiftpower.com/"), &origin));
        assert!(!oauth_succeeded(&url("https://zwiftpower.com.evil.net/"), &origin));
    }

    #[test]
    fn test_direct_login_judgment() {
        let home = url("https://zwiftpower.com/index.php");
        assert!(check_direct_login("<p>Welcome</p>", &home).is_ok());
        assert!(matches!(
            check_direct_login("<p>Invalid password entered</p>", &home),
            Err(AuthError::InvalidCredentials)
        ));
        let login = url("https://zwiftpower.com/ucp.php?mode=login");
        assert!(matches!(
            check_direct_login("<p>Hello</p>", &login),
            Err(AuthError::LoginFailed(_))
        ));
    }
}
