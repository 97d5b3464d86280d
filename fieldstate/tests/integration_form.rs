//! Integration tests for registration, values, array splices and notifications

use std::sync::Arc;

use fieldstate::{FieldInit, Form, FormConfig, FormConfigPatch, Instance, RenderMode, Selection};
use fieldstate_test_utils::{config_file, field_recorder, RecordingRenderer};
use serde_json::{json, Map, Value};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn nested_form() -> Form {
    Form::new(FormConfig {
        parse_name: true,
        ..Default::default()
    })
}

#[test_log::test]
fn test_nested_delete_then_insert_keeps_fields_on_their_elements() {
    let form = nested_form();
    form.set_values_quiet(object(json!({
        "contacts": [{"email": "a@x"}, {"email": "b@x"}, {"email": "c@x"}]
    })))
    .unwrap();
    for i in 0..3 {
        form.init(&format!("contacts.{i}.email"), FieldInit::new())
            .unwrap();
    }
    form.set_error("contacts.0.email", ["taken"]);

    // Drop the middle element
    form.delete_array_value("contacts", 1, 1).unwrap();
    assert_eq!(form.names(), vec!["contacts.0.email", "contacts.1.email"]);
    assert_eq!(
        form.get_value("contacts.1.email").unwrap(),
        Some(json!("c@x"))
    );
    assert_eq!(
        form.get_error("contacts.0.email"),
        Some(vec!["taken".to_string()])
    );

    // Insert in front of the old last element; its field moves to index 2
    form.add_array_value("contacts", 1, vec![json!({"email": "new@x"})])
        .unwrap();
    let mut names = form.names();
    names.sort();
    assert_eq!(names, vec!["contacts.0.email", "contacts.2.email"]);
    assert_eq!(
        form.get_value("contacts.2.email").unwrap(),
        Some(json!("c@x"))
    );

    // The inserted element's field registers fresh and reads the inserted value
    let snapshot = form
        .init("contacts.1.email", FieldInit::new().init_value(json!("ignored")))
        .unwrap();
    assert_eq!(snapshot.value, Some(json!("new@x")));
    assert_eq!(form.get_error("contacts.1.email"), None);
    assert_eq!(
        form.get_values(Selection::All).unwrap()["contacts"],
        json!([{"email": "a@x"}, {"email": "new@x"}, {"email": "c@x"}])
    );
}

#[test_log::test]
fn test_flat_splice_moves_values_with_entries() {
    let form = Form::new(FormConfig::default());
    for (i, v) in ["a", "b", "c", "d"].iter().enumerate() {
        form.init(&format!("tags.{i}"), FieldInit::new().init_value(json!(v)))
            .unwrap();
    }

    form.delete_array_value("tags", 0, 2).unwrap();

    let values = form.get_values(Selection::All).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values["tags.0"], json!("c"));
    assert_eq!(values["tags.1"], json!("d"));
    assert!(form.get("tags.2").is_none());
    assert!(form.get("tags.3").is_none());
}

#[test_log::test]
fn test_set_values_keeps_registered_fields_the_partial_does_not_cover() {
    let form = nested_form();
    form.init("user.name", FieldInit::new().init_value(json!("frank")))
        .unwrap();
    form.init("user.age", FieldInit::new().init_value(json!(30)))
        .unwrap();

    // `user` is replaced wholesale, but `user.age` is not named by the partial
    form.set_values(object(json!({"user": {"name": "joe"}})))
        .unwrap();
    assert_eq!(
        form.get_values(Selection::All).unwrap()["user"],
        json!({"name": "joe", "age": 30})
    );
}

#[test_log::test]
fn test_set_values_drops_registered_fields_under_a_replaced_leaf() {
    let form = nested_form();
    form.init("user.age", FieldInit::new().init_value(json!(30)))
        .unwrap();

    // `user` becomes a scalar, which cannot hold `age`
    form.set_values(object(json!({"user": "anonymous"}))).unwrap();
    assert_eq!(form.get_value("user").unwrap(), Some(json!("anonymous")));
    assert_eq!(
        form.get_values(["user.age"]).unwrap().get("user.age"),
        None
    );
}

#[test_log::test]
fn test_auto_unmount_caches_and_restores() {
    let form = Form::new(FormConfig::default());
    form.init(
        "nickname",
        FieldInit::new()
            .init_value(json!("frank"))
            .rules(json!({"required": true})),
    )
    .unwrap();
    form.set_value_quiet("nickname", json!("franky")).unwrap();

    let first: Instance = Arc::new(1u32);
    let second: Instance = Arc::new(2u32);
    form.attach_instance("nickname", Some(first)).unwrap();
    form.attach_instance("nickname", Some(second)).unwrap();

    // One of two instances gone; the field stays
    form.attach_instance("nickname", None).unwrap();
    assert!(form.get("nickname").is_some());

    form.attach_instance("nickname", None).unwrap();
    assert!(form.get("nickname").is_none());
    assert_eq!(form.get_value("nickname").unwrap(), None);

    let again: Instance = Arc::new(3u32);
    form.attach_instance("nickname", Some(again)).unwrap();
    let meta = form.get("nickname").unwrap();
    assert!(meta.has_rules());
    assert_eq!(form.get_value("nickname").unwrap(), Some(json!("franky")));
    assert!(form.instance("nickname").is_some());
}

#[test_log::test]
fn test_auto_unmount_disabled_keeps_field() {
    let form = Form::new(FormConfig {
        auto_unmount: false,
        ..Default::default()
    });
    form.init("nickname", FieldInit::new().init_value(json!("frank")))
        .unwrap();
    let instance: Instance = Arc::new(1u32);
    form.attach_instance("nickname", Some(instance)).unwrap();
    form.attach_instance("nickname", None).unwrap();

    assert!(form.get("nickname").is_some());
    assert_eq!(form.get_value("nickname").unwrap(), Some(json!("frank")));
}

#[test_log::test]
fn test_notify_routes_to_field_re_render_or_global() {
    let renderer = RecordingRenderer::new();
    let form = Form::builder().with_renderer(renderer.clone()).build();
    let (re_render, seen) = field_recorder();
    form.init(
        "title",
        FieldInit::new().re_render(move |reason| re_render(reason)),
    )
    .unwrap();
    form.init("body", FieldInit::new()).unwrap();

    form.set_value("title", json!("hello")).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["setValue".to_string()]);
    assert_eq!(renderer.count(), 0);

    // A field without its own re-render falls back to the form
    form.set_value("body", json!("text")).unwrap();
    assert_eq!(renderer.modes(), vec![RenderMode::State]);

    // Mixed selections also go global
    form.set_error("title", ["too short"]);
    form.notify(vec!["title", "body"], fieldstate::RenderReason::SetError);
    assert_eq!(renderer.count(), 2);
    assert_eq!(seen.lock().unwrap().len(), 2);

    form.set_options(FormConfigPatch {
        force_update: Some(true),
        ..Default::default()
    });
    form.set_values(object(json!({"body": "more"}))).unwrap();
    assert_eq!(renderer.modes().last(), Some(&RenderMode::Force));
}

#[test_log::test]
fn test_reset_to_default_restores_init_values() {
    let renderer = RecordingRenderer::new();
    let form = Form::builder().with_renderer(renderer.clone()).build();
    form.init("a", FieldInit::new().init_value(json!(1))).unwrap();
    form.init("b", FieldInit::new()).unwrap();
    form.set_value_quiet("a", json!(5)).unwrap();
    form.set_value_quiet("b", json!(6)).unwrap();
    form.set_error("a", ["bad"]);
    assert_eq!(renderer.count(), 1);

    form.reset_to_default(Selection::All).unwrap();

    assert_eq!(form.get_value("a").unwrap(), Some(json!(1)));
    assert_eq!(form.get_value("b").unwrap(), None);
    assert_eq!(form.get_error("a"), None);
    assert_eq!(renderer.count(), 2);

    // Nothing registered under the name: no notification
    form.reset("missing").unwrap();
    assert_eq!(renderer.count(), 2);
}

#[test_log::test]
fn test_config_loads_from_toml_file() {
    let file = config_file(
        r#"
parse_name = true
first = true
auto_unmount = false

[messages]
required = "%s is needed"
"#,
    )
    .unwrap();

    let config = FormConfig::load(Some(file.path())).unwrap();
    assert!(config.parse_name);
    assert!(config.first);
    assert!(!config.auto_unmount);
    assert!(config.auto_validate);
    assert_eq!(
        config.messages,
        Some(json!({"required": "%s is needed"}))
    );

    let form = Form::new(config);
    form.set_value_quiet("a.b", json!(1)).unwrap();
    assert_eq!(form.get_values(Selection::All).unwrap()["a"], json!({"b": 1}));
}

#[test_log::test]
fn test_malformed_config_is_an_error() {
    let file = config_file("first = \"sometimes\"\n").unwrap();
    assert!(FormConfig::load(Some(file.path())).is_err());
}
