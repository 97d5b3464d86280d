//! Integration tests for trigger and batch validation

use std::sync::{Arc, Mutex};

use fieldstate::{
    FieldInit, FieldStatus, FieldValidation, Form, FormConfig, FormError, RuleViolation,
    Selection, ValidateOptions,
};
use fieldstate_test_utils::{GatedEngine, RecordingRenderer, RuleEngine};
use serde_json::json;

fn form_with(engine: Arc<dyn fieldstate::Validator>) -> Form {
    Form::builder().with_validator(engine).build()
}

#[test_log::test(tokio::test)]
async fn test_trigger_validation_status_transitions() {
    let engine = RuleEngine::new();
    let form = form_with(engine.clone());
    let snapshot = form
        .init(
            "username",
            FieldInit::new().rules(json!([{"required": true}, {"minLength": 3}])),
        )
        .unwrap();
    assert_eq!(snapshot.events, vec!["onChange".to_string()]);
    assert_eq!(form.get_state("username"), FieldStatus::Idle);

    let pending = form
        .handle_event("username", "onChange", vec![json!("")])
        .unwrap()
        .unwrap();
    assert_eq!(form.get_state("username"), FieldStatus::Loading);
    let outcome = pending.await.unwrap();
    assert_eq!(
        outcome,
        FieldValidation::Applied {
            status: FieldStatus::Error,
            errors: vec!["username is required".to_string()],
            changed: true,
        }
    );
    assert_eq!(form.get_state("username"), FieldStatus::Error);

    let pending = form
        .handle_event("username", "onChange", vec![json!("frank")])
        .unwrap()
        .unwrap();
    // Typing clears the old errors right away
    assert_eq!(form.get_error("username"), None);
    pending.await.unwrap();
    assert_eq!(form.get_state("username"), FieldStatus::Success);
    assert_eq!(form.get_value("username").unwrap(), Some(json!("frank")));
    assert_eq!(engine.calls(), 2);
}

#[test_log::test(tokio::test)]
async fn test_rules_bound_to_other_triggers() {
    let engine = RuleEngine::new();
    let form = form_with(engine.clone());
    let snapshot = form
        .init(
            "email",
            FieldInit::new().rules(json!([
                {"required": true},
                {"minLength": 5, "trigger": "onBlur"}
            ])),
        )
        .unwrap();
    assert_eq!(
        snapshot.events,
        vec!["onChange".to_string(), "onBlur".to_string()]
    );

    form.handle_event("email", "onChange", vec![json!("a@b")])
        .unwrap()
        .unwrap()
        .await
        .unwrap();
    assert_eq!(form.get_state("email"), FieldStatus::Success);

    // Blur validates without touching the value
    let outcome = form
        .handle_event("email", "onBlur", vec![])
        .unwrap()
        .unwrap()
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        FieldValidation::Applied {
            status: FieldStatus::Error,
            ..
        }
    ));
    assert_eq!(form.get_value("email").unwrap(), Some(json!("a@b")));
    assert!(form.handle_event("email", "onFocus", vec![]).unwrap().is_none());
}

#[test_log::test(tokio::test)]
async fn test_stale_result_is_discarded() {
    let engine = GatedEngine::new();
    let form = form_with(engine.clone());
    form.init("code", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let first = tokio::spawn(
        form.handle_event("code", "onChange", vec![json!("")])
            .unwrap()
            .unwrap(),
    );
    engine.wait_for_calls(1).await;
    let second = tokio::spawn(
        form.handle_event("code", "onChange", vec![json!("42")])
            .unwrap()
            .unwrap(),
    );
    engine.wait_for_calls(2).await;

    // The newer call finishes first, the older one afterwards
    engine.release(1, vec![]);
    let applied = second.await.unwrap().unwrap();
    assert!(matches!(
        applied,
        FieldValidation::Applied {
            status: FieldStatus::Success,
            ..
        }
    ));
    engine.release(0, vec![RuleViolation::new("code", "code is required")]);
    assert_eq!(first.await.unwrap().unwrap(), FieldValidation::Superseded);

    assert_eq!(form.get_state("code"), FieldStatus::Success);
    assert_eq!(form.get_error("code"), None);
}

#[test_log::test(tokio::test)]
async fn test_engine_failure_leaves_field_as_it_was() {
    let engine = GatedEngine::new();
    let form = form_with(engine.clone());
    form.init("code", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let pending = tokio::spawn(form.validate_field("code", "onChange").unwrap().unwrap());
    engine.wait_for_calls(1).await;
    engine.fail(0, "engine offline");

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, FormError::Engine(_)));
    assert_eq!(form.get_state("code"), FieldStatus::Idle);
}

#[test_log::test(tokio::test)]
async fn test_batch_engine_failure_keeps_previous_errors() {
    let engine = GatedEngine::new();
    let form = form_with(engine.clone());
    form.init("code", FieldInit::new().rules(json!({"required": true})))
        .unwrap();
    form.init("zip", FieldInit::new().rules(json!({"required": true})).init_value(json!("0150")))
        .unwrap();
    form.set_error("code", ["server says no"]);

    let batch = tokio::spawn({
        let form = form.clone();
        async move { form.validate_promise(Selection::All).await }
    });
    engine.wait_for_calls(1).await;
    // Cleared while the engine works
    assert_eq!(form.get_error("code"), None);

    engine.fail(0, "engine offline");
    let err = batch.await.unwrap().unwrap_err();
    assert!(matches!(err, FormError::Engine(_)));
    assert_eq!(form.get_state("code"), FieldStatus::Error);
    assert_eq!(
        form.get_error("code"),
        Some(vec!["server says no".to_string()])
    );
    assert_eq!(form.get_state("zip"), FieldStatus::Idle);
}

#[test_log::test(tokio::test)]
async fn test_abandoned_validation_does_not_leave_field_loading() {
    let engine = GatedEngine::new();
    let form = form_with(engine.clone());
    form.init("code", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let pending = form
        .handle_event("code", "onChange", vec![json!("42")])
        .unwrap()
        .unwrap();
    let abandoned = tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
    assert!(abandoned.is_err());
    assert_eq!(form.get_state("code"), FieldStatus::Idle);
    assert_eq!(form.get_value("code").unwrap(), Some(json!("42")));

    // The engine answering late changes nothing
    engine.release(0, vec![RuleViolation::new("code", "code is required")]);
    tokio::task::yield_now().await;
    assert_eq!(form.get_state("code"), FieldStatus::Idle);
    assert_eq!(form.get_error("code"), None);
}

#[test_log::test(tokio::test)]
async fn test_batch_without_rules_skips_engine() {
    let engine = RuleEngine::new();
    let renderer = RecordingRenderer::new();
    let form = Form::builder()
        .with_validator(engine.clone())
        .with_renderer(renderer.clone())
        .build();
    form.init("a", FieldInit::new().init_value(json!(1))).unwrap();
    form.set_error("b", ["server says no"]);
    let before = renderer.count();

    let outcome = form.validate_promise(Selection::All).await.unwrap();
    assert_eq!(engine.calls(), 0);
    assert_eq!(renderer.count(), before);
    assert_eq!(outcome.values["a"], json!(1));
    assert_eq!(
        outcome.errors.unwrap()["b"],
        vec!["server says no".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn test_batch_groups_errors_and_marks_success() {
    let engine = RuleEngine::new();
    let form = Form::builder()
        .with_validator(engine.clone())
        .with_process_error_message(|message| message.to_uppercase())
        .build();
    form.init(
        "name",
        FieldInit::new()
            .rules(json!([{"required": true}, {"minLength": 2}]))
            .init_value(json!("x")),
    )
    .unwrap();
    form.init("city", FieldInit::new().rules(json!({"required": true})).init_value(json!("Oslo")))
        .unwrap();
    form.init("note", FieldInit::new()).unwrap();
    form.set_error("note", ["check this"]);

    let outcome = form.validate_promise(Selection::All).await.unwrap();
    let errors = outcome.errors.unwrap();

    // The report carries engine messages; the fields carry processed ones
    assert_eq!(errors["name"], vec!["name must be at least 2 characters"]);
    assert_eq!(errors["note"], vec!["check this"]);
    assert!(!errors.contains_key("city"));
    assert_eq!(
        form.get_error("name"),
        Some(vec!["NAME MUST BE AT LEAST 2 CHARACTERS".to_string()])
    );
    assert_eq!(form.get_state("name"), FieldStatus::Error);
    assert_eq!(form.get_state("city"), FieldStatus::Success);
    assert_eq!(form.get_state("note"), FieldStatus::Error);
    assert_eq!(engine.calls(), 1);
}

#[test_log::test(tokio::test)]
async fn test_batch_forwards_first_and_messages() {
    let engine = RuleEngine::new();
    let form = Form::builder()
        .with_validator(engine.clone())
        .with_config(FormConfig {
            messages: Some(json!({"required": "%s needed"})),
            ..Default::default()
        })
        .build();
    form.init("a", FieldInit::new().rules(json!({"required": true})))
        .unwrap();
    form.init("b", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let outcome = form
        .validate_promise_with(Selection::All, ValidateOptions::default().first(true))
        .await
        .unwrap();
    let errors = outcome.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors["a"], vec!["a needed"]);

    let request = engine.requests().pop().unwrap();
    assert!(request.options.first);
    assert_eq!(request.descriptor.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_callback_runs_after_validate_hook() {
    let hooked = Arc::new(Mutex::new(Vec::new()));
    let seen = hooked.clone();
    let form = Form::builder()
        .with_validator(RuleEngine::new())
        .with_after_validate(move |context| {
            let failed = context
                .errors_group
                .as_ref()
                .map(|group| group.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            seen.lock().unwrap().push((failed, context.options.scroll_to_first_error));
        })
        .build();
    form.init("title", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let mut received = None;
    form.validate_callback("title", |errors, values| {
        received = Some((errors.cloned(), values.clone()));
    })
    .await
    .unwrap();

    let (errors, values) = received.unwrap();
    assert_eq!(errors.unwrap()["title"], vec!["title is required"]);
    assert!(values.is_empty());
    assert_eq!(
        *hooked.lock().unwrap(),
        vec![(vec!["title".to_string()], true)]
    );
}

#[test_log::test(tokio::test)]
async fn test_post_processor_failure_rejects() {
    let form = form_with(RuleEngine::new());
    form.init("title", FieldInit::new().rules(json!({"required": true})))
        .unwrap();

    let err = form
        .validate_promise_then(Selection::All, |outcome| async move {
            if outcome.is_valid() {
                Ok(())
            } else {
                Err(anyhow::anyhow!("form has errors"))
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FormError::PostProcess { .. }));

    form.set_value_quiet("title", json!("Hello")).unwrap();
    let title = form
        .validate_promise_then("title", |outcome| async move {
            Ok(outcome.values["title"].clone())
        })
        .await
        .unwrap();
    assert_eq!(title, json!("Hello"));
}
