//! End-to-end router dispatch tests.

mod common;

use bytes::Bytes;
use common::{body_str, get, request};
use http::{Method, StatusCode, header};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use waymark::{Error, Router, handler_fn};

/// A handler writing a fixed marker into the response body.
fn writes(marker: &'static str) -> Arc<dyn waymark::Handler> {
    handler_fn(move |c| {
        Box::pin(async move {
            c.write_str(marker);
            Ok(())
        })
    })
}

/// A handler echoing the named parameter.
fn echoes(param: &'static str) -> Arc<dyn waymark::Handler> {
    handler_fn(move |c| {
        Box::pin(async move {
            let value = c.param(param).to_string();
            c.write_str(&value);
            Ok(())
        })
    })
}

#[tokio::test]
async fn test_match_specificity() {
    common::init_tracing();
    let mut router = Router::new();
    router.get("/a/b", vec![writes("static")]);
    router.get("/a/<x>", vec![echoes("x")]);
    router.get("/a/*", vec![echoes("*")]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/a/b")).await;
    assert_eq!(body_str(&response), "static");

    let response = router.handle_request(get("/a/c")).await;
    assert_eq!(body_str(&response), "c");

    let response = router.handle_request(get("/a/c/d")).await;
    assert_eq!(body_str(&response), "c/d");
}

#[tokio::test]
async fn test_regex_constraint_falls_through_to_404() {
    let mut router = Router::new();
    router.get("/user/<id:\\d+>", vec![echoes("id")]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/user/42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_str(&response), "42");

    let response = router.handle_request(get("/user/abc")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_method_not_allowed_lists_methods() {
    let mut router = Router::new();
    router.get("/thing", vec![writes("got")]);
    router.route("/thing").put(vec![writes("put")]);
    let router = Arc::new(router);

    let response = router
        .handle_request(request(Method::POST, "/thing", &[], Bytes::new()))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers()[header::ALLOW].to_str().unwrap();
    assert_eq!(allow, "GET, PUT, OPTIONS");

    // The OPTIONS safety net answers 200 with the same header.
    let response = router
        .handle_request(request(Method::OPTIONS, "/thing", &[], Bytes::new()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ALLOW].to_str().unwrap(),
        "GET, PUT, OPTIONS"
    );
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let mut router = Router::new();
    router.get("/known", vec![writes("ok")]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/unknown")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_str(&response), "Not Found");
}

#[tokio::test]
async fn test_handler_error_statuses() {
    let mut router = Router::new();
    router.get(
        "/forbidden",
        vec![handler_fn(|_| {
            Box::pin(async { Err(Error::with_status(StatusCode::FORBIDDEN, "nope")) })
        })],
    );
    router.get(
        "/broken",
        vec![handler_fn(|_| {
            Box::pin(async {
                Err(Box::<dyn std::error::Error + Send + Sync>::from("boom").into())
            })
        })],
    );
    let router = Arc::new(router);

    let response = router.handle_request(get("/forbidden")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_str(&response), "nope");

    let response = router.handle_request(get("/broken")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_str(&response), "boom");
}

#[tokio::test]
async fn test_middleware_wraps_downstream() {
    let mut router = Router::new();
    router.use_middleware([handler_fn(|c| {
        Box::pin(async move {
            c.write_str("[");
            c.next().await?;
            c.write_str("]");
            Ok(())
        })
    })]);
    router.get("/wrapped", vec![writes("body")]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/wrapped")).await;
    assert_eq!(body_str(&response), "[body]");

    // The fallback chain runs the same middleware.
    let response = router.handle_request(get("/missing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_abort_skips_remaining_handlers() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran_tail = Arc::clone(&ran);

    let mut router = Router::new();
    router.get(
        "/gated",
        vec![
            handler_fn(|c| {
                Box::pin(async move {
                    c.write_str("gate");
                    c.abort();
                    Ok(())
                })
            }),
            handler_fn(move |_| {
                let ran_tail = Arc::clone(&ran_tail);
                Box::pin(async move {
                    ran_tail.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        ],
    );
    let router = Arc::new(router);

    let response = router.handle_request(get("/gated")).await;
    assert_eq!(body_str(&response), "gate");
    assert_eq!(ran.load(Ordering::SeqCst), 0, "aborted handler must not run");
}

#[tokio::test]
async fn test_url_round_trip() {
    let mut router = Router::new();
    router
        .route("/users/<id:\\d+>/tags/<tag>")
        .name("user.tag")
        .get(vec![handler_fn(|c| {
            Box::pin(async move {
                let echoed = format!("{}|{}", c.param("id"), c.param("tag"));
                c.write_str(&echoed);
                Ok(())
            })
        })]);
    let router = Arc::new(router);

    let url = router.url("user.tag", &[("id", "42"), ("tag", "a b")]).unwrap();
    assert_eq!(url, "/users/42/tags/a%20b");

    // Matching the built URL recovers the original values.
    let response = router.handle_request(get(&url)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_str(&response), "42|a b");
}

#[tokio::test]
async fn test_group_middleware_scoping() {
    let mut router = Router::new();
    router.get("/public", vec![writes("public")]);
    {
        let mut admin = router.group("/admin");
        admin.use_middleware([handler_fn(|c| {
            Box::pin(async move {
                c.write_str("admin:");
                c.next().await
            })
        })]);
        admin.get("/panel", vec![writes("panel")]);
    }
    let router = Arc::new(router);

    let response = router.handle_request(get("/admin/panel")).await;
    assert_eq!(body_str(&response), "admin:panel");

    // Group middleware does not leak onto ungrouped routes.
    let response = router.handle_request(get("/public")).await;
    assert_eq!(body_str(&response), "public");
}

#[tokio::test]
async fn test_multi_method_registration() {
    let mut router = Router::new();
    router
        .route("/form")
        .to("GET,POST", vec![handler_fn(|c| {
            Box::pin(async move {
                let method = c.method().to_string();
                c.write_str(&method);
                Ok(())
            })
        })]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/form")).await;
    assert_eq!(body_str(&response), "GET");
    let response = router
        .handle_request(request(Method::POST, "/form", &[], Bytes::new()))
        .await;
    assert_eq!(body_str(&response), "POST");
}

#[tokio::test]
async fn test_custom_not_found_handlers() {
    let mut router = Router::new();
    router.not_found(vec![handler_fn(|c| {
        Box::pin(async move {
            c.set_status(StatusCode::NOT_FOUND);
            c.write_str("custom miss");
            Ok(())
        })
    })]);
    let router = Arc::new(router);

    let response = router.handle_request(get("/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_str(&response), "custom miss");
}
