//! End-to-end tests: manifest files on disk, the facade and an in-process bus.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use spindle::prelude::*;
use tempfile::TempDir;

type Calls = Arc<Mutex<Vec<(String, Vec<Value>)>>>;

/// A registry whose functions record `(name, args)` on every call.
fn registry(calls: &Calls, names: &[&'static str]) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    for &name in names {
        let calls = Arc::clone(calls);
        registry.register(
            name,
            sync_code(move |args| {
                calls.lock().push((name.to_string(), args));
                Ok(())
            }),
        );
    }
    registry
}

fn write(dir: &Path, file: &str, text: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

fn app(calls: &Calls, names: &[&'static str], options: Value) -> (Arc<EventBus>, Application<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let app = Application::builder()
        .client(Arc::clone(&bus))
        .loader(ManifestLoader::new(registry(calls, names)))
        .options(options)
        .build()
        .unwrap();
    (bus, app)
}

fn names(calls: &Calls) -> Vec<String> {
    calls.lock().iter().map(|(name, _)| name.clone()).collect()
}

#[tokio::test]
async fn test_callable_and_record_both_receive_payload() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);
    write(
        dir.path(),
        "b.toml",
        r#"
        name = "beta"
        code = { fn = "beta" }
        "#,
    );

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code", "beta"], json!({}));

    assert!(app.on("ping", dir.path(), None).unwrap().is_some());
    bus.emit("ping", vec![json!(42)]).await.unwrap();

    assert_eq!(
        *calls.lock(),
        [
            ("code".to_string(), vec![json!(42)]),
            ("beta".to_string(), vec![json!(42)]),
        ]
    );

    let cache = app.cache().unwrap().read();
    let handlers = cache.get(Mode::On, "ping").unwrap();
    assert_eq!(handlers[1].name, "beta");
}

#[tokio::test]
async fn test_non_handlers_and_other_suffixes_are_ignored() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);
    write(dir.path(), "wrong_name.toml", r#"fn = "other""#);
    write(dir.path(), "plain.toml", "name = \"no code here\"\n");
    write(dir.path(), "notes.txt", r#"fn = "code""#);

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code", "other"], json!({}));
    app.on("ping", dir.path(), None).unwrap();
    bus.emit("ping", vec![]).await.unwrap();

    assert_eq!(names(&calls), ["code"]);
}

#[tokio::test]
async fn test_second_registration_does_not_rescan() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);
    write(dir.path(), "b.toml", "code = { fn = \"beta\" }\n");

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code", "beta"], json!({}));
    app.on("ping", dir.path(), None).unwrap();

    fs::remove_file(dir.path().join("b.toml")).unwrap();
    assert!(app.on("ping", dir.path(), None).unwrap().is_none());
    assert_eq!(bus.listener_count("ping"), 1);

    bus.emit("ping", vec![json!(1)]).await.unwrap();
    assert_eq!(names(&calls), ["code", "beta"]);
}

#[tokio::test]
async fn test_dispatch_order_follows_scan_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "b.toml", "code = { fn = \"b\" }\n");
    write(dir.path(), "a/z.toml", "code = { fn = \"az\" }\n");
    write(dir.path(), "c.toml", "code = { fn = \"c\" }\n");

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["az", "b", "c"], json!({}));
    app.on("tick", dir.path(), None).unwrap();

    bus.emit("tick", vec![]).await.unwrap();
    bus.emit("tick", vec![]).await.unwrap();
    assert_eq!(names(&calls), ["az", "b", "c", "az", "b", "c"]);
}

#[tokio::test]
async fn test_record_data_is_not_passed_to_code() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "a.toml",
        r#"
        code = { fn = "code" }

        [data]
        secret = "hidden"
        "#,
    );

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code"], json!({}));
    app.on(
        "ping",
        dir.path(),
        Some(callback(|firing| firing.set([json!("extra")]))),
    )
    .unwrap();

    bus.emit("ping", vec![json!(1), json!(2)]).await.unwrap();
    assert_eq!(calls.lock()[0].1, [json!(1), json!(2), json!("extra")]);

    let cache = app.cache().unwrap().read();
    assert_eq!(
        cache.get(Mode::On, "ping").unwrap()[0].data,
        Some(json!({ "secret": "hidden" }))
    );
}

#[tokio::test]
async fn test_run_subscribes_once_per_declared_target() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "greet.toml",
        r#"
        code = { fn = "greet" }

        [data]
        event = "join"
        once = false
        "#,
    );
    write(
        dir.path(),
        "welcome.toml",
        r#"
        code = { fn = "welcome" }
        event = "join"
        once = false
        "#,
    );
    write(
        dir.path(),
        "boot.toml",
        r#"
        code = { fn = "boot" }
        event = "ready"
        once = true
        "#,
    );

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["greet", "welcome", "boot"], json!({}));

    assert_eq!(app.run(None, dir.path(), None, None).unwrap().len(), 2);
    assert!(app.run(None, dir.path(), None, None).unwrap().is_empty());
    assert_eq!(bus.listener_count("join"), 1);
    assert_eq!(bus.listener_count("ready"), 1);

    bus.emit("ready", vec![]).await.unwrap();
    bus.emit("ready", vec![]).await.unwrap();
    bus.emit("join", vec![json!("ann")]).await.unwrap();
    assert_eq!(names(&calls), ["boot", "greet", "welcome"]);
}

#[tokio::test]
async fn test_once_fires_a_single_time() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code"], json!({}));
    app.once("ready", dir.path(), None).unwrap();

    bus.emit("ready", vec![]).await.unwrap();
    bus.emit("ready", vec![]).await.unwrap();
    assert_eq!(names(&calls).len(), 1);
}

#[tokio::test]
async fn test_once_again_after_firing_subscribes_nothing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code"], json!({}));
    assert!(app.once("ready", dir.path(), None).unwrap().is_some());
    assert_eq!(bus.emit("ready", vec![]).await.unwrap(), 1);

    assert!(app.once("ready", dir.path(), None).unwrap().is_none());
    assert_eq!(bus.emit("ready", vec![]).await.unwrap(), 0);
    assert_eq!(names(&calls).len(), 1);
}

#[tokio::test]
async fn test_disabled_cache_reloads_files_on_every_firing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code", "beta"], json!({ "cache": { "enable": false } }));
    app.on("ping", dir.path(), None).unwrap();
    assert!(app.cache().is_none());

    bus.emit("ping", vec![]).await.unwrap();
    write(dir.path(), "a.toml", "code = { fn = \"beta\" }\n");
    bus.emit("ping", vec![]).await.unwrap();

    assert_eq!(names(&calls), ["code", "beta"]);
}

#[tokio::test]
async fn test_failing_handler_aborts_the_firing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", "code = { fn = \"fail\" }\n");
    write(dir.path(), "b.toml", r#"fn = "code""#);

    let calls: Calls = Default::default();
    let mut registry = registry(&calls, &["code"]);
    registry.register("fail", sync_code(|_| anyhow::bail!("handler exploded")));

    let bus = Arc::new(EventBus::new());
    let mut app = Application::builder()
        .client(Arc::clone(&bus))
        .loader(ManifestLoader::new(registry))
        .build()
        .unwrap();
    app.on("ping", dir.path(), None).unwrap();

    let err = bus.emit("ping", vec![]).await.unwrap_err();
    match err.kind() {
        ErrorKind::Reading { event, path, source } => {
            assert_eq!(event, "ping");
            assert_eq!(path, &dir.path().join("a.toml"));
            assert_eq!(source.to_string(), "handler exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(calls.lock().is_empty());
}

#[test]
fn test_empty_event_is_rejected() {
    let calls: Calls = Default::default();
    let (_bus, mut app) = app(&calls, &[], json!({}));

    let err = app.on("", "handlers", None).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::MissingEvent));
    assert_eq!(err.to_string(), "unexpected error: missing event");
}

#[test]
fn test_load_errors_surface_at_registration() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.toml", "code = { fn = \"nobody\" }\n");

    let calls: Calls = Default::default();
    let (_bus, mut app) = app(&calls, &["code"], json!({}));

    let err = app.on("ping", dir.path(), None).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Load { .. }));
}

#[tokio::test]
async fn test_custom_nomenclature_and_extension() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.hdl", "run = { fn = \"run\" }\n");
    write(dir.path(), "b.toml", "run = { fn = \"run\" }\n");

    let calls: Calls = Default::default();
    let (bus, mut app) = app(
        &calls,
        &["run"],
        json!({
            "nomenclature": { "code": "run" },
            "filter": { "extension": ".hdl" }
        }),
    );
    app.on("ping", dir.path(), None).unwrap();
    bus.emit("ping", vec![]).await.unwrap();

    assert_eq!(names(&calls), ["run"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_does_not_abort_registration() {
    use std::os::unix::fs::symlink;

    let dir = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    write(dir.path(), "a.toml", r#"fn = "code""#);
    write(elsewhere.path(), "b.toml", r#"fn = "code""#);
    symlink(elsewhere.path(), dir.path().join("linked")).unwrap();

    let calls: Calls = Default::default();
    let (bus, mut app) = app(&calls, &["code"], json!({ "filter": { "extension": "" } }));
    app.on("ping", dir.path(), None).unwrap();
    bus.emit("ping", vec![]).await.unwrap();

    assert_eq!(names(&calls), ["code"]);
}

#[test]
fn test_default_features_load_toml_config() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "spindle.toml",
        r#"
        [options.nomenclature]
        code = "run"

        [options.filter]
        extension = ".hdl"
        "#,
    );

    let config = ConfigLoader::new()
        .without_env()
        .file(dir.path().join("spindle.toml"))
        .load()
        .unwrap();
    assert_eq!(config.options.nomenclature.code, "run");
    assert_eq!(config.options.filter.extension, ".hdl");
}
