//! Integration test common infrastructure.
//!
//! Request builders and response assertions for driving a router
//! end-to-end without a network listener.

use bytes::Bytes;
use http::{Method, header};
use waymark::{Request, Response};

/// Install a tracing subscriber honoring `RUST_LOG`, once per test
/// binary.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a request with headers and a body.
pub fn request(method: Method, path: &str, headers: &[(&str, &str)], body: Bytes) -> Request {
    let mut builder = http::Request::builder().method(method).uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(body).expect("request")
}

/// Build a GET request.
pub fn get(path: &str) -> Request {
    request(Method::GET, path, &[], Bytes::new())
}

/// Build a GET request carrying a session cookie.
#[allow(dead_code)]
pub fn get_with_cookie(path: &str, name: &str, value: &str) -> Request {
    let cookie = format!("{name}={value}");
    request(Method::GET, path, &[("cookie", cookie.as_str())], Bytes::new())
}

/// The response body as UTF-8 text.
pub fn body_str(response: &Response) -> &str {
    std::str::from_utf8(response.body()).expect("utf-8 body")
}

/// The parsed `Set-Cookie` entry with the given name, if present.
#[allow(dead_code)]
pub fn response_cookie(response: &Response, name: &str) -> Option<cookie::Cookie<'static>> {
    for value in response.headers().get_all(header::SET_COOKIE) {
        let raw = value.to_str().ok()?.to_string();
        if let Ok(parsed) = cookie::Cookie::parse(raw)
            && parsed.name() == name
        {
            return Some(parsed.into_owned());
        }
    }
    None
}
