//! Integration tests for step loading, submission and navigation.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stepvault_core::{CoreError, Database, Factory, Key, Value};
use stepvault_step::{
    ComponentWrapper, DatabaseMap, DatabaseSlot, Orchestrator, Step, StepDefinition, StepError,
    StepPhase, SubmitOutcome,
};
use stepvault_testkit::prelude::*;

fn ada() -> String {
    "ada".to_string()
}

fn address_step() -> StepDefinition {
    StepDefinition::new("address")
        .component(
            ComponentWrapper::new("city")
                .empty_value("")
                .required(true)
                .database_map(DatabaseMap::typed::<Profiles>(&ada()).nested("address", "city")),
        )
        .component(
            ComponentWrapper::new("zip")
                .empty_value("")
                .database_map(DatabaseMap::typed::<Profiles>(&ada()).nested("address", "zip")),
        )
        .component(
            ComponentWrapper::new("name")
                .empty_value("")
                .database_map(DatabaseMap::typed::<Profiles>(&ada()).field("name")),
        )
}

#[tokio::test]
async fn components_sharing_a_record_all_persist() {
    init_tracing();
    let db = TestDatabase::open().await.unwrap();
    let step = Step::mount(address_step());
    step.on_change("city", "London").unwrap();
    step.on_change("zip", "N1").unwrap();
    step.on_change("name", "Ada").unwrap();

    assert_eq!(step.submit(&db).await.unwrap(), SubmitOutcome::Submitted);
    assert_eq!(step.phase(), StepPhase::Submitted);

    let profile = db.get::<Profiles>(&ada()).await.unwrap().unwrap();
    assert_eq!(profile.name.as_deref(), Some("Ada"));
    assert_eq!(profile.address.city.as_deref(), Some("London"));
    assert_eq!(profile.address.zip.as_deref(), Some("N1"));
}

#[tokio::test]
async fn empty_value_deletes_only_the_leaf() {
    let db = TestDatabase::open().await.unwrap();
    db.seed(
        "profiles",
        "ada",
        json_record(json!({"name": "Ada", "address": {"city": "London", "zip": "N1"}})),
    )
    .await
    .unwrap();

    let step = Step::mount(address_step());
    step.load(&db).await.unwrap();
    step.on_change("zip", "").unwrap();
    step.submit(&db).await.unwrap();

    assert_eq!(
        db.record("profiles", "ada").await.unwrap(),
        Some(json_record(
            json!({"name": "Ada", "address": {"city": "London"}})
        ))
    );
}

#[tokio::test]
async fn emptied_parent_and_record_are_kept() {
    let db = TestDatabase::open().await.unwrap();
    db.seed("profiles", "ada", json_record(json!({"address": {"zip": "N1"}})))
        .await
        .unwrap();

    let step = Step::mount(
        StepDefinition::new("zip").component(
            ComponentWrapper::new("zip")
                .empty_value("")
                .database_map(DatabaseMap::new("profiles", "ada").nested("address", "zip")),
        ),
    );
    step.submit(&db).await.unwrap();

    assert_eq!(
        db.record("profiles", "ada").await.unwrap(),
        Some(json_record(json!({"address": {}})))
    );
}

#[tokio::test]
async fn whole_record_component_deletes_on_empty() {
    let db = TestDatabase::open().await.unwrap();
    db.put::<Answers>(&1, &"yes".to_string()).await.unwrap();

    let step = Step::mount(
        StepDefinition::new("answer").component(
            ComponentWrapper::new("q1")
                .empty_value("")
                .database_map(DatabaseMap::typed::<Answers>(&1)),
        ),
    );
    step.load(&db).await.unwrap();
    assert_eq!(step.values().get("q1"), Some(&Value::from("yes")));

    step.on_change("q1", "").unwrap();
    step.submit(&db).await.unwrap();
    assert_eq!(db.get::<Answers>(&1).await.unwrap(), None);
}

#[tokio::test]
async fn decimal_values_persist_and_load() {
    let db = TestDatabase::open().await.unwrap();
    let definition = || {
        StepDefinition::new("rate").component(
            ComponentWrapper::new("rate")
                .database_map(DatabaseMap::typed::<Profiles>(&ada()).field("rate")),
        )
    };

    let step = Step::mount(definition());
    step.on_change("rate", 19.99).unwrap();
    step.submit(&db).await.unwrap();
    assert_eq!(
        db.record("profiles", "ada").await.unwrap(),
        Some(Value::object([("rate", Value::Float(19.99))]))
    );

    let reloaded = Step::mount(definition());
    reloaded.load(&db).await.unwrap();
    assert_eq!(reloaded.values().get("rate"), Some(&Value::from(19.99)));
}

#[tokio::test]
async fn hidden_component_record_is_purged() {
    let db = TestDatabase::open().await.unwrap();
    db.put::<Answers>(&2, &"stale".to_string()).await.unwrap();

    let step = Step::mount(
        StepDefinition::new("follow-up")
            .component(ComponentWrapper::new("more").empty_value(false))
            .component(
                ComponentWrapper::new("detail")
                    .empty_value("")
                    .render_when(|values| values.get("more") == Some(&Value::Bool(true)))
                    .database_map(DatabaseMap::typed::<Answers>(&2)),
            ),
    );
    // The in-memory value does not matter once the component is hidden.
    step.on_change("detail", "typed before hiding").unwrap();
    step.submit(&db).await.unwrap();

    assert_eq!(db.get::<Answers>(&2).await.unwrap(), None);
}

#[tokio::test]
async fn hidden_field_purges_the_record_it_shares() {
    let db = TestDatabase::open().await.unwrap();
    let hidden_city = || {
        ComponentWrapper::new("city")
            .empty_value("")
            .render_when(|values| values.get("abroad") == Some(&Value::Bool(true)))
            .database_map(DatabaseMap::typed::<Profiles>(&ada()).nested("address", "city"))
    };
    let name = || {
        ComponentWrapper::new("name")
            .empty_value("")
            .database_map(DatabaseMap::typed::<Profiles>(&ada()).field("name"))
    };
    let abroad = || ComponentWrapper::new("abroad").empty_value(false);

    // The visible field is written first, then the hidden one deletes the
    // whole record at the shared key.
    db.seed(
        "profiles",
        "ada",
        json_record(json!({"age": 36, "address": {"city": "Oslo"}})),
    )
    .await
    .unwrap();
    let step = Step::mount(
        StepDefinition::new("visible-first")
            .component(abroad())
            .component(name())
            .component(hidden_city()),
    );
    step.on_change("name", "Ada").unwrap();
    step.on_change("city", "Oslo").unwrap();
    step.submit(&db).await.unwrap();
    assert_eq!(db.record("profiles", "ada").await.unwrap(), None);

    // Declared the other way round, the purge runs first and the visible
    // field lands in a fresh record.
    db.seed(
        "profiles",
        "ada",
        json_record(json!({"age": 36, "address": {"city": "Oslo"}})),
    )
    .await
    .unwrap();
    let step = Step::mount(
        StepDefinition::new("hidden-first")
            .component(abroad())
            .component(hidden_city())
            .component(name()),
    );
    step.on_change("name", "Ada").unwrap();
    step.submit(&db).await.unwrap();
    assert_eq!(
        db.record("profiles", "ada").await.unwrap(),
        Some(json_record(json!({"name": "Ada"})))
    );
}

#[tokio::test]
async fn missing_required_value_writes_nothing() {
    let db = TestDatabase::open().await.unwrap();
    let reported = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&reported);
    let after = Arc::new(AtomicUsize::new(0));
    let after_seen = Arc::clone(&after);

    let step = Step::mount(
        address_step()
            .on_incomplete_submit(move |missing| seen.lock().extend_from_slice(missing))
            .after_submit(move |_| {
                after_seen.fetch_add(1, Ordering::SeqCst);
            }),
    );
    step.on_change("name", "Ada").unwrap();

    let outcome = step.submit(&db).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Incomplete(vec!["city".to_string()]));
    assert_eq!(*reported.lock(), vec!["city".to_string()]);
    assert_eq!(step.phase(), StepPhase::IncompleteRejected);
    assert_eq!(after.load(Ordering::SeqCst), 0);
    assert_eq!(db.count("profiles").await.unwrap(), 0);

    step.on_change("city", "Paris").unwrap();
    assert_eq!(step.phase(), StepPhase::Interacting);
    assert_eq!(step.submit(&db).await.unwrap(), SubmitOutcome::Submitted);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submit_hook_runs_after_persisting_and_before_after_submit() {
    let db = TestDatabase::open().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    let hook_order = Arc::clone(&order);
    let after_order = Arc::clone(&order);
    let hook_db = db.db.clone();

    let step = Step::mount(
        StepDefinition::new("answer")
            .component(
                ComponentWrapper::new("q1").database_map(DatabaseMap::typed::<Answers>(&1)),
            )
            .submit(move |values| {
                let order = Arc::clone(&hook_order);
                let db = hook_db.clone();
                async move {
                    let stored = db.get::<Answers>(&1).await?;
                    assert_eq!(stored.as_deref(), Some("42"));
                    assert_eq!(values.get("q1"), Some(&Value::from("42")));
                    order.lock().push("submit");
                    Ok(())
                }
            })
            .after_submit(move |_| after_order.lock().push("after_submit")),
    );
    step.on_change("q1", "42").unwrap();
    step.submit(&db).await.unwrap();

    assert_eq!(*order.lock(), vec!["submit", "after_submit"]);
}

#[tokio::test]
async fn failing_submit_hook_fails_the_submission() {
    let db = TestDatabase::open().await.unwrap();
    let after = Arc::new(AtomicUsize::new(0));
    let after_seen = Arc::clone(&after);
    let step = Step::mount(
        StepDefinition::new("answer")
            .component(
                ComponentWrapper::new("q1").database_map(DatabaseMap::typed::<Answers>(&1)),
            )
            .submit(|_| async { Err(StepError::from(CoreError::callback("rejected"))) })
            .after_submit(move |_| {
                after_seen.fetch_add(1, Ordering::SeqCst);
            }),
    );
    step.on_change("q1", "42").unwrap();

    let err = step.submit(&db).await.unwrap_err();
    assert_eq!(err, StepError::from(CoreError::callback("rejected")));
    assert_eq!(step.phase(), StepPhase::Interacting);
    assert_eq!(after.load(Ordering::SeqCst), 0);
    assert_eq!(db.get::<Answers>(&1).await.unwrap().as_deref(), Some("42"));
}

#[tokio::test]
async fn computed_key_reads_inside_the_same_transaction() {
    let db = TestDatabase::open().await.unwrap();
    db.put::<Sessions>(&"current".to_string(), &"grace".to_string())
        .await
        .unwrap();

    let map = DatabaseMap::computed("profiles", &["sessions"], |stores| async move {
        let user = stores
            .store::<Sessions>()?
            .get(&"current".to_string())
            .await?
            .unwrap_or_default();
        Ok(Key::from(user))
    })
    .field("name");
    assert_eq!(
        map.store_names().into_iter().collect::<Vec<_>>(),
        vec!["profiles", "sessions"]
    );

    let step = Step::mount(
        StepDefinition::new("name").component(ComponentWrapper::new("name").database_map(map)),
    );
    assert_eq!(step.store_names(), vec!["profiles", "sessions"]);
    step.on_change("name", "Grace").unwrap();
    step.submit(&db).await.unwrap();

    let profile = db.get::<Profiles>(&"grace".to_string()).await.unwrap().unwrap();
    assert_eq!(profile.name.as_deref(), Some("Grace"));
}

#[tokio::test]
async fn load_keeps_empty_values_for_absent_records() {
    let db = TestDatabase::open().await.unwrap();
    db.seed("profiles", "ada", json_record(json!({"name": "Ada"})))
        .await
        .unwrap();

    let step = Step::mount(address_step());
    step.load(&db).await.unwrap();
    assert!(!step.is_disabled());

    let values = step.values();
    assert_eq!(values.get("name"), Some(&Value::from("Ada")));
    assert_eq!(values.get("city"), Some(&Value::from("")));
    assert_eq!(step.keys_missing_values(), vec!["city"]);
}

#[tokio::test]
async fn missing_store_fails_the_submission() {
    let db = TestDatabase::open().await.unwrap();
    let step = Step::mount(
        StepDefinition::new("broken")
            .component(ComponentWrapper::new("x").database_map(DatabaseMap::new("nowhere", 1))),
    );
    step.on_change("x", 1).unwrap();

    let err = step.submit(&db).await.unwrap_err();
    assert!(matches!(err, StepError::Core(CoreError::Engine(_))));
    assert_eq!(step.phase(), StepPhase::Interacting);
}

fn flow() -> Orchestrator<FormSchema> {
    Orchestrator::new(DatabaseSlot::new())
        .register(
            StepDefinition::new("name")
                .component(
                    ComponentWrapper::new("name")
                        .empty_value("")
                        .required(true)
                        .database_map(DatabaseMap::typed::<Profiles>(&ada()).field("name")),
                )
                .next_slug("answer"),
        )
        .register(
            StepDefinition::new("answer")
                .component(
                    ComponentWrapper::new("q1").database_map(DatabaseMap::typed::<Answers>(&1)),
                ),
        )
}

#[tokio::test]
async fn orchestrator_advances_after_submit() {
    let db = TestDatabase::open().await.unwrap();
    let mut flow = flow();
    flow.slot().set(db.db.clone()).unwrap();

    assert_eq!(flow.start().unwrap().slug(), "name");
    assert_eq!(
        flow.submit().await.unwrap(),
        SubmitOutcome::Incomplete(vec!["name".to_string()])
    );
    assert_eq!(flow.current().unwrap().slug(), "name");

    flow.current().unwrap().on_change("name", "Ada").unwrap();
    assert_eq!(flow.submit().await.unwrap(), SubmitOutcome::Submitted);
    assert_eq!(flow.current().unwrap().slug(), "answer");

    // The last step has no next slug and stays mounted.
    flow.current().unwrap().on_change("q1", "done").unwrap();
    flow.submit().await.unwrap();
    assert_eq!(flow.current().unwrap().slug(), "answer");
    assert_eq!(
        db.get::<Answers>(&1).await.unwrap().as_deref(),
        Some("done")
    );
}

#[tokio::test]
async fn orchestrator_rejects_unknown_slugs() {
    let mut flow = flow();
    assert_eq!(
        flow.navigate("missing").unwrap_err(),
        StepError::unknown_slug("missing")
    );
    assert_eq!(flow.submit().await.unwrap_err(), StepError::NotMounted);

    flow.navigate("answer").unwrap();
    assert_eq!(flow.submit().await.unwrap_err(), StepError::NoDatabase);
    assert_eq!(flow.load_current().await.unwrap_err(), StepError::NoDatabase);
}

#[tokio::test]
async fn orchestrator_loads_the_current_step() {
    let db = TestDatabase::open().await.unwrap();
    db.put::<Answers>(&1, &"stored".to_string()).await.unwrap();
    let mut flow = flow();
    flow.slot().set(db.db.clone()).unwrap();
    flow.navigate("answer").unwrap();

    flow.load_current().await.unwrap();
    assert_eq!(
        flow.current().unwrap().values().get("q1"),
        Some(&Value::from("stored"))
    );
}

#[tokio::test]
async fn database_slot_is_set_once() {
    let factory = Factory::new();
    let first = Database::<FormSchema>::open(&factory, "forms", 1, create_all_stores())
        .await
        .unwrap();
    let other = Database::<FormSchema>::open(&factory, "db", 1, create_all_stores())
        .await
        .unwrap();

    let slot = DatabaseSlot::new();
    assert!(slot.get().is_none());

    let waiter = {
        let slot = slot.clone();
        tokio::spawn(async move { slot.ready().await.name().to_string() })
    };
    tokio::task::yield_now().await;

    slot.set(first.clone()).unwrap();
    assert_eq!(waiter.await.unwrap(), "forms");

    // The same connection again is fine.
    slot.set(first.clone()).unwrap();
    assert_eq!(slot.set(other), Err(StepError::HandleChanged));
    assert_eq!(slot.get().unwrap().name(), "forms");
}
