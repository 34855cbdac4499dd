//! End-to-end runs of the Contact Center services through the bulk runner
//! against the in-memory platform.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::{QueueRole, TOOL};
use crate::bulk::{BulkRow, RowStatus};
use crate::services::Action;
use crate::testing::{
    assert_clean_rollback, assert_row_failed, assert_row_status, assert_row_succeeded,
    zoomcc_runner as runner, FakeContactCenter,
};

fn row(action: Action, data: serde_json::Value) -> Vec<BulkRow> {
    vec![BulkRow::new(action, data)]
}

#[tokio::test]
async fn test_repeated_membership_update_makes_no_assignment_calls() {
    let fake = Arc::new(FakeContactCenter::new());
    let sales = fake.seed_queue("Sales");
    let ann = fake.seed_user("ann@example.com");
    let bob = fake.seed_user("bob@example.com");
    fake.seed_disposition("Sold");
    let runner = runner(&fake);
    let update = json!({
        "queue_name": "Sales",
        "agents": "ann@example.com, bob@example.com",
        "supervisors": "bob@example.com",
        "dispositions": "Sold"
    });

    let first = runner.run(TOOL, "queues", row(Action::Update, update.clone())).await;
    assert_eq!(first.succeeded(), 1);
    assert_eq!(fake.queue_members(&sales, QueueRole::Agent), vec![ann, bob.clone()]);
    assert_eq!(fake.queue_members(&sales, QueueRole::Supervisor), vec![bob]);

    fake.clear_requests();
    let second = runner.run(TOOL, "queues", row(Action::Update, update)).await;
    assert_eq!(second.succeeded(), 1);
    assert_eq!(fake.request_count("POST", ""), 0);
    assert_eq!(fake.request_count("PATCH", ""), 0);
}

#[tokio::test]
async fn test_failed_create_leaves_no_residue() {
    let fake = Arc::new(FakeContactCenter::new());
    fake.seed_role("Agent");
    let sales = fake.seed_queue("Sales");
    fake.fail_when("POST", &format!("queues/{sales}/agents"), None, 400, "Queue is full.");

    let report = runner(&fake)
        .run(
            TOOL,
            "users",
            row(
                Action::Create,
                json!({"user_email": "new@example.com", "role_name": "Agent", "agent_queues": "Sales"}),
            ),
        )
        .await;

    assert_row_failed(
        &report.rows[0],
        "assign agents new@example.com to queue Sales: Queue is full.",
    );
    assert!(fake.find("users", "new@example.com").is_none());
    assert_eq!(fake.count("users"), 0);
}

#[tokio::test]
async fn test_update_rollback_restores_only_changed_fields() {
    let fake = Arc::new(FakeContactCenter::new());
    let sales = fake.seed_queue("Sales");
    fake.seed_user("ann@example.com");
    fake.fail_when("POST", "agents", None, 400, "Agent is not licensed.");
    let before = fake.entity("queues", &sales).unwrap();

    let report = runner(&fake)
        .run(
            TOOL,
            "queues",
            row(
                Action::Update,
                json!({
                    "queue_name": "Sales",
                    "queue_description": "Inbound sales",
                    "wrap_up_time": 45,
                    "max_wait_time": "5m",
                    "agents": "ann@example.com"
                }),
            ),
        )
        .await;

    assert_eq!(report.failed(), 1);
    assert_eq!(fake.entity("queues", &sales).unwrap(), before);

    let patches: Vec<_> = fake
        .requests()
        .into_iter()
        .filter(|r| r.method == "PATCH")
        .collect();
    assert_eq!(patches.len(), 2);
    assert_eq!(
        patches[1].body,
        Some(json!({"queue_description": "Sales queue", "wrap_up_time": 30}))
    );
}

#[tokio::test]
async fn test_second_skill_failure_removes_the_first() {
    let fake = Arc::new(FakeContactCenter::new());
    let category = fake.seed_skill_category("Languages", "proficiency");
    let french = fake.seed_skill(&category, "French");
    let german = fake.seed_skill(&category, "German");
    let ann = fake.seed_user("ann@example.com");
    fake.fail_when("POST", "skills", Some(german.as_str()), 400, "Skill limit reached.");

    let report = runner(&fake)
        .run(
            TOOL,
            "users",
            row(
                Action::Update,
                json!({"user_email": "ann@example.com", "skills": "Languages:French=3, Languages:German=2"}),
            ),
        )
        .await;

    let outcome = &report.rows[0];
    assert_eq!(outcome.error_kind.as_deref(), Some("operation_failed"));
    assert_row_failed(
        outcome,
        "assign skills Languages:German=2 to ann@example.com: Skill limit reached.",
    );
    assert!(!fake.user_skill_ids(&ann).contains(&french));
    assert_clean_rollback(outcome);
}

#[tokio::test]
async fn test_each_kind_is_listed_once_per_row() {
    let fake = Arc::new(FakeContactCenter::new());
    fake.seed_queue("Sales");
    for email in ["ann@example.com", "bob@example.com", "cy@example.com"] {
        fake.seed_user(email);
    }

    let report = runner(&fake)
        .run(
            TOOL,
            "queues",
            row(
                Action::Update,
                json!({
                    "queue_name": "Sales",
                    "agents": "ann@example.com;bob@example.com",
                    "supervisors_to_remove": "cy@example.com"
                }),
            ),
        )
        .await;

    assert_eq!(report.succeeded(), 1);
    let user_lists = fake
        .requests()
        .iter()
        .filter(|r| r.method == "GET" && r.path == "users")
        .count();
    assert_eq!(user_lists, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_create_waits_for_retry_after() {
    let fake = Arc::new(FakeContactCenter::new());
    fake.rate_limit("POST", "dispositions", 2, Some(2));
    let started = tokio::time::Instant::now();

    let report = runner(&fake)
        .run(TOOL, "dispositions", row(Action::Create, json!({"disposition_name": "Sold"})))
        .await;

    assert_row_succeeded(&report.rows[0]);
    assert_eq!(fake.request_count("POST", "dispositions"), 3);
    assert!(started.elapsed() >= Duration::from_secs(4));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_rate_limit_fails_the_row() {
    let fake = Arc::new(FakeContactCenter::new());
    fake.rate_limit("POST", "dispositions", 5, None);

    let report = runner(&fake)
        .run(TOOL, "dispositions", row(Action::Create, json!({"disposition_name": "Sold"})))
        .await;

    assert_row_failed(
        &report.rows[0],
        "create disposition Sold: Too many requests. Please try again later.",
    );
    assert_eq!(fake.request_count("POST", "dispositions"), 3);
    assert_eq!(fake.count("dispositions"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_rolls_back_in_flight_row_and_skips_the_rest() {
    let fake = Arc::new(FakeContactCenter::new());
    fake.seed_user("ann@example.com");
    fake.rate_limit("POST", "queues", 1, Some(5));
    let runner = runner(&fake);
    let cancel = Arc::clone(runner.cancellation());

    let rows = vec![
        BulkRow::new(
            Action::Create,
            json!({"queue_name": "Sales", "channel_type": "voice", "agents": "ann@example.com"}),
        ),
        BulkRow::new(Action::Create, json!({"queue_name": "Support", "channel_type": "voice"})),
    ];
    let job = tokio::spawn(async move { runner.run(TOOL, "queues", rows).await });

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel("operator abort");
    let report = job.await.unwrap();

    assert_row_failed(&report.rows[0], "Operation cancelled: operator abort");
    assert_row_status(&report.rows[1], RowStatus::Skipped);
    assert_eq!(fake.count("queues"), 0);
    assert_eq!(fake.request_count("POST", "agents"), 0);
}

#[tokio::test]
async fn test_disposition_lifecycle() {
    let fake = Arc::new(FakeContactCenter::new());
    let outcomes = fake.seed_disposition_set("Outcomes");
    let runner = runner(&fake);

    let rows = vec![
        BulkRow::new(Action::Create, json!({"disposition_name": "Sold", "disposition_sets": "Outcomes"})),
        BulkRow::new(Action::Update, json!({"disposition_name": "Sold", "disposition_description": "Closed won"})),
        BulkRow::new(Action::Delete, json!({"disposition_name": "Sold"})),
    ];
    let report = runner.run(TOOL, "dispositions", rows).await;

    assert_eq!(report.succeeded(), 3);
    assert_eq!(
        report.rows[1].entity.as_ref().and_then(|e| e.str_field("disposition_description")),
        Some("Closed won")
    );
    assert!(fake.set_members(&outcomes).is_empty());
    assert_eq!(fake.count("dispositions"), 0);
}
