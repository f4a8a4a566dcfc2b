//! End-to-end tests for the HTTP gateway.
//!
//! Each test assembles a full application context against a temporary
//! directory (audit log, signal store, drop-in module dir) and drives the
//! router directly with `tower::ServiceExt::oneshot`.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use tuxd::config::Config;
use tuxd::context::AppContext;
use tuxd::registry::Resolution;
use tuxd::server::build_router;

const EXAMPLE_MANIFEST: &str = r#"
display_name = "Example Module"
description = "An example module that adds a simple 'echo' test."

[[commands]]
key = "echo"
description = "A simple test command."
shell = 'echo "Hello from the example module!"'
"#;

struct TestGateway {
    app: Router,
    ctx: Arc<AppContext>,
    _dir: TempDir,
}

impl TestGateway {
    /// Bootstrap a gateway with the example module dropped into a fresh
    /// module directory. `extra_manifests` lands alongside it.
    fn new(pin: Option<&str>, readonly: bool, extra_manifests: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let tux = dir.path().join("tux");
        std::fs::create_dir_all(&tux).unwrap();
        std::fs::write(tux.join("example.toml"), EXAMPLE_MANIFEST).unwrap();
        for (file, contents) in extra_manifests {
            std::fs::write(tux.join(file), contents).unwrap();
        }

        let config = Config {
            device_name: "test-device".to_string(),
            pin: pin.map(|p| p.to_string()),
            tux_dir: tux,
            audit_log: dir.path().join("audit.log"),
            database_dir: dir.path().join("database"),
            readonly,
            ..Default::default()
        };
        let ctx = AppContext::bootstrap(config).unwrap();
        Self {
            app: build_router(ctx.clone()),
            ctx,
            _dir: dir,
        }
    }

    async fn request(&self, method: &str, uri: &str, pin: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(pin) = pin {
            builder = builder.header("X-Device-PIN", pin);
        }
        let response = self
            .app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn audit_lines(&self, needle: &str) -> usize {
        self.ctx.audit.flush();
        std::fs::read_to_string(self.ctx.config.audit_log.clone())
            .unwrap_or_default()
            .lines()
            .filter(|l| l.contains(needle))
            .count()
    }
}

#[tokio::test]
async fn discover_works_without_pin() {
    let gw = TestGateway::new(Some("1234"), false, &[]);
    let (status, body) = gw.request("GET", "/api/discover", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deviceName"], "test-device");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn liveness_works_without_pin() {
    let gw = TestGateway::new(Some("1234"), false, &[]);
    let (status, body) = gw.request("GET", "/api/test", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn wrong_pin_is_denied_with_one_audit_entry() {
    let gw = TestGateway::new(Some("1234"), false, &[]);
    let warns_before = gw.audit_lines("[WARN]");

    let (status, body) = gw
        .request("GET", "/api/termux/battery", Some("0000"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    assert_eq!(gw.audit_lines("[WARN]") - warns_before, 1);
    // The audit entry names the request, never the attempted PIN.
    assert_eq!(gw.audit_lines("0000"), 0);
}

#[tokio::test]
async fn missing_pin_is_denied() {
    let gw = TestGateway::new(Some("1234"), false, &[]);
    let (status, _) = gw.request("GET", "/api/server-info", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_configured_pin_means_insecure_mode() {
    let gw = TestGateway::new(None, false, &[]);
    let (status, body) = gw.request("GET", "/api/modules/example/echo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "Hello from the example module!");
}

#[tokio::test]
async fn readonly_blocks_state_changing_requests_before_auth() {
    let gw = TestGateway::new(Some("1234"), true, &[]);

    // Correct PIN does not help.
    let (status, body) = gw.request("POST", "/api/root/reboot", Some("1234")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());

    // Wrong PIN is also 403, not 401: the policy check precedes auth.
    let (status, _) = gw.request("POST", "/api/root/reboot", Some("0000")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(gw.audit_lines("[AUTH]"), 0);
    assert_eq!(gw.audit_lines("[POLICY]"), 2);
}

#[tokio::test]
async fn readonly_blocks_privileged_reads_under_the_root_prefix() {
    let gw = TestGateway::new(Some("1234"), true, &[]);
    let (status, _) = gw.request("GET", "/api/root/whoami", Some("1234")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn readonly_blocks_privileged_plugin_commands_outside_the_prefix() {
    // infrared scan is a GET outside /api/root, but privileged; dispatch
    // must still reject it in read-only mode.
    let gw = TestGateway::new(Some("1234"), true, &[]);
    let (status, _) = gw
        .request("GET", "/api/modules/infrared/scan", Some("1234"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn readonly_still_serves_plain_reads() {
    let gw = TestGateway::new(None, true, &[]);
    let (status, body) = gw.request("GET", "/api/modules/example/echo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn unknown_route_is_404_and_method_mismatch_is_405() {
    let gw = TestGateway::new(None, false, &[]);

    let (status, body) = gw.request("GET", "/api/termux/no-such-thing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (status, _) = gw.request("POST", "/api/termux/battery", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = gw.request("GET", "/definitely/not/api", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_module_is_skipped_and_advertised_routes_stay_callable() {
    let gw = TestGateway::new(
        None,
        false,
        &[("broken.toml", "display_name = [this is not toml")],
    );

    assert_eq!(gw.audit_lines("Skipping invalid module file"), 1);

    let (status, body) = gw.request("GET", "/api/server-info", None).await;
    assert_eq!(status, StatusCode::OK);

    let modules = body["modules"].as_array().unwrap();
    let names: Vec<&str> = modules
        .iter()
        .map(|m| m["basePath"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"/api/modules/example"));
    assert!(!names.iter().any(|n| n.contains("broken")));

    // Introspection and the routing table are built from the same
    // descriptors: every advertised route must resolve to a command.
    for module in modules {
        for route in module["routes"].as_array().unwrap() {
            let path = route["path"].as_str().unwrap();
            let method: axum::http::Method =
                route["method"].as_str().unwrap().parse().unwrap();
            assert!(
                matches!(
                    gw.ctx.registry.resolve(path, &method),
                    Resolution::Command(_)
                ),
                "advertised route {path} does not resolve"
            );
        }
    }
}

#[tokio::test]
async fn execution_failure_returns_500_with_stderr() {
    let gw = TestGateway::new(
        None,
        false,
        &[(
            "failing.toml",
            r#"
display_name = "Failing"

[[commands]]
key = "boom"
shell = "echo diagnostics >&2; exit 7"
"#,
        )],
    );

    let (status, body) = gw.request("GET", "/api/modules/failing/boom", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("code 7"));
    assert_eq!(body["stderr"], "diagnostics");
}

#[tokio::test]
async fn stderr_on_success_becomes_a_warning() {
    let gw = TestGateway::new(
        None,
        false,
        &[(
            "chatty.toml",
            r#"
display_name = "Chatty"

[[commands]]
key = "talk"
shell = "echo result; echo grumble >&2"
"#,
        )],
    );

    let (status, body) = gw.request("GET", "/api/modules/chatty/talk", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["output"], "result");
    assert_eq!(body["warnings"], "grumble");
}

#[tokio::test]
async fn timeout_returns_distinct_500_promptly() {
    let gw = TestGateway::new(
        None,
        false,
        &[(
            "slowpoke.toml",
            r#"
display_name = "Slowpoke"

[[commands]]
key = "hang"
shell = "sleep 30"
timeout_ms = 300
"#,
        )],
    );

    let start = std::time::Instant::now();
    let (status, body) = gw.request("GET", "/api/modules/slowpoke/hang", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("timed out"));
    assert!(
        start.elapsed() < std::time::Duration::from_secs(5),
        "timeout did not fire promptly: {:?}",
        start.elapsed()
    );
}

#[tokio::test]
async fn infrared_roundtrip_over_http() {
    let gw = TestGateway::new(None, false, &[]);

    // Save, then the list view shows the name.
    let (status, _) = gw
        .request(
            "POST",
            "/api/modules/infrared/save?name=tv_power&code=9000%204500%20560",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = gw.request("GET", "/api/modules/infrared/list", None).await;
    assert_eq!(body["output"]["buttons"], serde_json::json!(["tv_power"]));

    // Rename preserves the payload under the new name only.
    let (status, _) = gw
        .request(
            "POST",
            "/api/modules/infrared/rename?old_name=tv_power&new_name=tv_main",
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = gw.request("GET", "/api/modules/infrared/list", None).await;
    assert_eq!(body["output"]["buttons"], serde_json::json!(["tv_main"]));

    let codes = gw.ctx.signals.load().unwrap();
    assert_eq!(codes.get("tv_main").map(String::as_str), Some("9000 4500 560"));

    // Delete removes it from the store and from subsequent list views.
    let (status, _) = gw
        .request("POST", "/api/modules/infrared/delete?name=tv_main", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = gw.request("GET", "/api/modules/infrared/list", None).await;
    assert_eq!(body["output"]["buttons"], serde_json::json!([]));
    assert!(gw.ctx.signals.load().unwrap().is_empty());

    let (status, _) = gw
        .request("POST", "/api/modules/infrared/delete?name=tv_main", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn infrared_missing_params_are_400_before_any_spawn() {
    let gw = TestGateway::new(None, false, &[]);

    let (status, body) = gw
        .request("POST", "/api/modules/infrared/save?name=tv", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("code"));

    let (status, _) = gw
        .request("POST", "/api/modules/infrared/send", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_trail_records_final_status_of_authenticated_requests() {
    let gw = TestGateway::new(Some("1234"), false, &[]);

    let (status, _) = gw
        .request("GET", "/api/modules/example/echo", Some("1234"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(gw.audit_lines("\"GET /api/modules/example/echo\" 200"), 1);
}

#[tokio::test]
async fn signal_store_survives_context_rebuilds() {
    // Same database dir across two bootstraps: saved codes persist.
    let dir = tempfile::tempdir().unwrap();
    let config = |p: &Path| Config {
        tux_dir: p.join("tux"),
        audit_log: p.join("audit.log"),
        database_dir: p.join("database"),
        ..Default::default()
    };

    let ctx = AppContext::bootstrap(config(dir.path())).unwrap();
    ctx.signals.insert("persisted", "1 2 3").unwrap();
    drop(ctx);

    let ctx = AppContext::bootstrap(config(dir.path())).unwrap();
    assert_eq!(
        ctx.signals.get("persisted").unwrap().as_deref(),
        Some("1 2 3")
    );
}
