//! Login and session lifecycle tests against a local fake site.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wattcache_core::auth::{
    AuthError, AuthOptions, Authenticator, CookieJar, Credential, Session, SessionStore,
};

const EMAIL: &str = "rider@example.com";
const PASSWORD: &str = "hunter2";

const DIRECT_LOGIN_PAGE: &str = r#"<html><body>
<h2>Login Required</h2>
<form id="login" action="./ucp.php?mode=login" method="post">
  <input type="text" name="username" value="">
  <input type="password" name="password">
  <input type="hidden" name="sid" value="abc123">
  <input type="submit" name="login" value="Login">
</form>
</body></html>"#;

const OAUTH_LOGIN_PAGE: &str = r#"<html><body>
<p>Login Required</p>
<a class="btn" href="/auth/realms/zwift/protocol/openid-connect/auth?client_id=zp">Login with Zwift</a>
</body></html>"#;

const IDP_PAGE: &str = r#"<html><body>
<form id="kc-form-login" action="/auth/realms/zwift/login-actions/authenticate?code=s1" method="post">
  <input type="text" name="username">
  <input type="password" name="password">
  <input type="hidden" name="credentialId" value="">
</form>
</body></html>"#;

fn options(server: &MockServer) -> AuthOptions {
    AuthOptions {
        base_url: server.uri(),
        ..AuthOptions::default()
    }
}

fn credential() -> Credential {
    Credential::new(EMAIL, PASSWORD)
}

fn authenticator(server: &MockServer, dir: &Path) -> Authenticator {
    Authenticator::new(
        Some(credential()),
        SessionStore::new(dir.to_path_buf()),
        options(server),
    )
}

fn session_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}

/// Login page, direct form submission and the landing page it redirects to
async fn mount_direct_login(server: &MockServer, expected_logins: u64) {
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .and(query_param("mode", "login"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(DIRECT_LOGIN_PAGE, "text/html"))
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ucp.php"))
        .and(body_string_contains("sid=abc123"))
        .and(body_string_contains("username=rider%40example.com"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/index.php"))
        .expect(expected_logins)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "phpbb3_sid=xyz; Path=/")
                .set_body_raw("<html>Welcome back</html>", "text/html"),
        )
        .mount(server)
        .await;
}

fn stale_session(age: Duration) -> Session {
    let jar = Arc::new(CookieJar::new());
    Session::new(
        credential().identity_hash(),
        Utc::now() - age,
        jar,
        reqwest::Client::new(),
    )
}

#[tokio::test]
async fn test_direct_login_persists_session() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;

    let temp = TempDir::new().unwrap();
    let auth = authenticator(&server, temp.path());

    let session = auth.get_session().await.unwrap();
    assert!(session.age() < Duration::minutes(1));
    assert_eq!(session.identity_hash(), credential().identity_hash());
    assert!(session
        .cookie_jar()
        .snapshot()
        .iter()
        .any(|c| c.name == "phpbb3_sid" && c.value == "xyz"));

    let stored = SessionStore::new(temp.path().to_path_buf())
        .load(EMAIL)
        .expect("session was persisted");
    assert_eq!(stored.created_at, session.created_at());

    // The file never holds the raw identity or secret
    let raw = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| std::fs::read_to_string(e.path()).unwrap())
        .collect::<String>();
    assert!(!raw.contains(EMAIL));
    assert!(!raw.contains(PASSWORD));
}

#[tokio::test]
async fn test_invalid_password_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(DIRECT_LOGIN_PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ucp.php"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<p>Invalid password provided</p>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let auth = authenticator(&server, temp.path());

    let result = auth.get_session().await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    assert_eq!(session_files(temp.path()), 0);
    assert!(auth.session_age().await.is_none());
}

#[tokio::test]
async fn test_still_on_login_page_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(DIRECT_LOGIN_PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>Try again</p>", "text/html"))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let result = authenticator(&server, temp.path()).get_session().await;
    assert!(matches!(result, Err(AuthError::LoginFailed(_))));
    assert_eq!(session_files(temp.path()), 0);
}

#[tokio::test]
async fn test_saved_session_is_reused_after_probe() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api3.php"))
        .and(query_param("do", "status"))
        .and(header("cookie", "phpbb3_sid=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let first = authenticator(&server, temp.path()).get_session().await.unwrap();

    // A fresh process: nothing in memory, only the file on disk
    let second = authenticator(&server, temp.path()).get_session().await.unwrap();
    assert_eq!(second.created_at(), first.created_at());
}

#[tokio::test]
async fn test_expired_session_triggers_one_login() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api3.php"))
        .and(query_param("do", "status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = SessionStore::new(temp.path().to_path_buf());
    store.save(&stale_session(Duration::hours(7))).unwrap();

    let session = authenticator(&server, temp.path()).get_session().await.unwrap();
    assert!(session.age() < Duration::minutes(1));

    let stored = store.load(EMAIL).unwrap();
    assert!(!stored.is_expired(Duration::hours(6)));
}

#[tokio::test]
async fn test_corrupt_session_file_triggers_one_login() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api3.php"))
        .and(query_param("do", "status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let file = temp
        .path()
        .join(format!("session_{}.json", credential().identity_hash()));
    std::fs::write(&file, "{\"created_at\": \"yesterday\", \"cookies\": [").unwrap();

    let session = authenticator(&server, temp.path()).get_session().await.unwrap();
    assert!(session.age() < Duration::minutes(1));

    // The broken file was replaced, not joined by a second one
    assert_eq!(session_files(temp.path()), 1);
    let stored = SessionStore::new(temp.path().to_path_buf())
        .load(EMAIL)
        .expect("fresh session replaced the corrupt file");
    assert_eq!(stored.created_at, session.created_at());
}

#[tokio::test]
async fn test_rejected_probe_triggers_login() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/api3.php"))
        .and(query_param("do", "status"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let old = stale_session(Duration::hours(1));
    SessionStore::new(temp.path().to_path_buf()).save(&old).unwrap();

    let session = authenticator(&server, temp.path()).get_session().await.unwrap();
    assert!(session.created_at() > old.created_at());
}

#[tokio::test]
async fn test_oauth_flow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(OAUTH_LOGIN_PAGE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/realms/zwift/protocol/openid-connect/auth"))
        .and(query_param("client_id", "zp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(IDP_PAGE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/realms/zwift/login-actions/authenticate"))
        .and(query_param("code", "s1"))
        .and(body_string_contains("username=rider%40example.com"))
        .and(body_string_contains("password=hunter2"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/events.php"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/events.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "phpbb3_sid=oauth; Path=/")
                .set_body_raw("<html>Events</html>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    // The site's own form must not be used when an OAuth anchor exists
    Mock::given(method("POST"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let session = authenticator(&server, temp.path()).get_session().await.unwrap();
    assert!(session
        .cookie_jar()
        .snapshot()
        .iter()
        .any(|c| c.name == "phpbb3_sid" && c.value == "oauth"));
    assert_eq!(session_files(temp.path()), 1);
}

#[tokio::test]
async fn test_oauth_error_redirect_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(OAUTH_LOGIN_PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/realms/zwift/protocol/openid-connect/auth"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(IDP_PAGE, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/realms/zwift/login-actions/authenticate"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "/landing?error=access_denied"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let result = authenticator(&server, temp.path()).get_session().await;
    assert!(matches!(result, Err(AuthError::LoginFailed(_))));
    assert_eq!(session_files(temp.path()), 0);
}

#[tokio::test]
async fn test_already_authenticated_skips_form() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ucp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<html>Your profile</html>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    assert!(authenticator(&server, temp.path()).get_session().await.is_ok());
    assert_eq!(session_files(temp.path()), 1);
}

#[tokio::test]
async fn test_missing_credentials_fail_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let auth = Authenticator::new(
        Some(Credential::new(EMAIL, "")),
        SessionStore::new(temp.path().to_path_buf()),
        options(&server),
    );
    assert!(matches!(
        auth.get_session().await,
        Err(AuthError::MissingCredentials)
    ));

    let anonymous = Authenticator::new(
        None,
        SessionStore::new(temp.path().to_path_buf()),
        options(&server),
    );
    assert!(matches!(
        anonymous.get_session().await,
        Err(AuthError::MissingCredentials)
    ));
}

#[tokio::test]
async fn test_logout_removes_saved_session() {
    let server = MockServer::start().await;
    mount_direct_login(&server, 1).await;

    let temp = TempDir::new().unwrap();
    let auth = authenticator(&server, temp.path());
    auth.get_session().await.unwrap();
    assert_eq!(session_files(temp.path()), 1);

    auth.logout().await;
    assert_eq!(session_files(temp.path()), 0);
    assert!(auth.session_age().await.is_none());
    assert!(!auth.check_session_valid().await);
}
