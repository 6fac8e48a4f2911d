use httpmock::Method::GET;
use httpmock::MockServer;
use scrapechain::{Client, CookieJar};
use std::collections::HashMap;

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

#[test]
fn test_session_cookies_sent() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/account").header(
            "cookie",
            "last_post_id=918829937; login_date=20230810_135603; username=bob",
        );
        then.status(200).body("welcome");
    });

    let client = Client::new().expect("client should build");
    let auth = client
        .auth(&server.url("/account"), "GET", None)
        .expect("auth stage");
    auth.cookie("username=bob; login_date=20230810_135603")
        .expect("string cookies");
    let request = auth
        .cookie(HashMap::from([(
            "last_post_id".to_string(),
            "918829937".to_string(),
        )]))
        .expect("map cookies");

    let response = request.dispatch().expect("request should succeed");
    assert_eq!(response.text(), "welcome");
    mock.assert();
}

#[test]
fn test_set_cookie_shared_across_builders() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(GET).path("/login");
        then.status(200)
            .header("set-cookie", "session=xyz; Path=/; HttpOnly")
            .body("logged in");
    });
    let profile = server.mock(|when, then| {
        when.method(GET)
            .path("/profile")
            .header("cookie", "session=xyz");
        then.status(200).body("profile");
    });

    let client = Client::new().expect("client should build");
    let response = client
        .no_auth(&server.url("/login"), "GET")
        .expect("builder")
        .dispatch()
        .expect("login");
    login.assert();

    let mut expected = CookieJar::new();
    expected.set("session", "xyz");
    assert_eq!(client.session().cookies(), expected);
    assert_eq!(
        response.headers().get("set-cookie").map(|v| v.to_str().unwrap_or_default()),
        Some("session=xyz; Path=/; HttpOnly")
    );

    client
        .no_auth(&server.url("/profile"), "GET")
        .expect("builder")
        .dispatch()
        .expect("profile");
    profile.assert();
}

#[test]
fn test_response_headers_as_cookie_source() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/token");
        then.status(200).header("set-cookie", "token=t0k3n").body("");
    });

    let issuer = Client::new().expect("client should build");
    let response = issuer
        .no_auth(&server.url("/token"), "GET")
        .expect("builder")
        .dispatch()
        .expect("token");

    let other = Client::new().expect("client should build");
    other
        .auth(&server.url("/"), "GET", None)
        .expect("auth stage")
        .cookie(response.headers())
        .expect("header cookies");
    assert_eq!(other.session().cookies().get("token"), Some("t0k3n"));
}

#[test]
fn test_cookie_set_on_redirect_is_kept() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start();
    let login = server.mock(|when, then| {
        when.method(GET).path("/login");
        then.status(302)
            .header("set-cookie", "session=xyz; Path=/")
            .header("location", "/home");
    });
    let home = server.mock(|when, then| {
        when.method(GET).path("/home").header("cookie", "session=xyz");
        then.status(200).body("home");
    });

    let client = Client::new().expect("client should build");
    let response = client
        .no_auth(&server.url("/login"), "GET")
        .expect("builder")
        .dispatch()
        .expect("login");

    login.assert();
    home.assert();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.url().path(), "/home");
    assert_eq!(client.session().cookies().get("session"), Some("xyz"));
}

#[test]
fn test_learned_cookies_stay_on_their_host() {
    if !can_bind_localhost() {
        return;
    }

    let issuer = MockServer::start();
    issuer.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200).header("set-cookie", "secret=a-only").body("a");
    });
    let other = MockServer::start();
    let leaked = other.mock(|when, then| {
        when.method(GET).path("/").header_exists("cookie");
        then.status(200).body("leaked");
    });
    let clean = other.mock(|when, then| {
        when.method(GET).path("/").header_missing("cookie");
        then.status(200).body("clean");
    });

    let client = Client::new().expect("client should build");
    client
        .no_auth(&issuer.url("/"), "GET")
        .expect("builder")
        .dispatch()
        .expect("issuer");

    let other_url = format!("http://localhost:{}/", other.port());
    let response = client
        .no_auth(&other_url, "GET")
        .expect("builder")
        .dispatch()
        .expect("other host");

    assert_eq!(response.text(), "clean");
    clean.assert();
    leaked.assert_hits(0);
    assert_eq!(client.session().cookies().get("secret"), Some("a-only"));
    assert!(client.session().cookies_for(response.url()).is_empty());
}
