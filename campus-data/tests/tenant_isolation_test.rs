//! Cross-tenant isolation: no operation may observe or mutate another
//! tenant's rows, regardless of what the caller passes.

use campus_data::{DataConfig, DataService, DeleteOptions, UpdateOptions};
use campus_test_utils::{
    seed_active_tenant, student_row, Filter, MemoryBackend, QueryParams, Row, TenantFixture,
};
use serde_json::json;
use std::sync::Arc;

async fn setup_two_tenants() -> (
    Arc<MemoryBackend>,
    DataService,
    TenantFixture,
    TenantFixture,
) {
    let backend = Arc::new(MemoryBackend::new());
    let green = seed_active_tenant(&backend, "greenfield").await;
    let hill = seed_active_tenant(&backend, "hillside").await;
    let service = DataService::new(Arc::clone(&backend) as _, DataConfig::default());
    (backend, service, green, hill)
}

#[tokio::test]
async fn test_rows_are_never_visible_across_tenants() {
    let (_backend, service, green, hill) = setup_two_tenants().await;

    service
        .create(&green.session(), "students", student_row("Asha", "c-1"))
        .await
        .unwrap();

    let theirs = service
        .read(&hill.session(), "students", QueryParams::new())
        .await
        .unwrap();
    assert!(theirs.rows.is_empty(), "tenant B must never see tenant A rows");

    let ours = service
        .read(&green.session(), "students", QueryParams::new())
        .await
        .unwrap();
    assert_eq!(ours.rows.len(), 1);
}

#[tokio::test]
async fn test_caller_supplied_tenant_id_is_overridden_on_create() {
    let (_backend, service, green, hill) = setup_two_tenants().await;

    let mut sneaky = student_row("Vik", "c-1");
    sneaky.insert("tenant_id".into(), json!(hill.tenant_id.to_string()));

    let created = service
        .create(&green.session(), "students", sneaky)
        .await
        .unwrap();
    assert_eq!(
        created[0].get("tenant_id"),
        Some(&json!(green.tenant_id.to_string())),
        "stored tenant_id must equal the session's tenant"
    );

    let theirs = service
        .read(&hill.session(), "students", QueryParams::new())
        .await
        .unwrap();
    assert!(theirs.rows.is_empty());
}

#[tokio::test]
async fn test_caller_tenant_filter_cannot_widen_a_read() {
    let (_backend, service, green, hill) = setup_two_tenants().await;

    service
        .create(&hill.session(), "students", student_row("Mira", "c-2"))
        .await
        .unwrap();

    // Tenant A tries to read tenant B's rows by filtering on their id.
    let params = QueryParams::new().with_filter(Filter::eq(
        "tenant_id",
        json!(hill.tenant_id.to_string()),
    ));
    let result = service
        .read(&green.session(), "students", params)
        .await
        .unwrap();
    assert!(result.rows.is_empty(), "spoofed tenant filter must be discarded");
}

#[tokio::test]
async fn test_update_cannot_touch_another_tenants_row() {
    let (backend, service, green, hill) = setup_two_tenants().await;

    let created = service
        .create(&green.session(), "students", student_row("Asha", "c-1"))
        .await
        .unwrap();
    let id = campus_data::row_id(&created[0]).unwrap();

    let mut patch = Row::new();
    patch.insert("name".into(), json!("Hijacked"));
    let updated = service
        .update(&hill.session(), "students", id, patch, UpdateOptions::default())
        .await
        .unwrap();
    assert!(updated.is_empty());

    // The row is unchanged for its owner.
    let row = service
        .read_one(&green.session(), "students", id)
        .await
        .unwrap();
    assert_eq!(row.get("name"), Some(&json!("Asha")));
    assert_eq!(backend.table_len("students"), 1);
}

#[tokio::test]
async fn test_delete_cannot_touch_another_tenants_row() {
    let (backend, service, green, hill) = setup_two_tenants().await;

    let created = service
        .create(&green.session(), "students", student_row("Asha", "c-1"))
        .await
        .unwrap();
    let id = campus_data::row_id(&created[0]).unwrap();

    let affected = service
        .delete(
            &hill.session(),
            "students",
            id,
            DeleteOptions { hard_delete: true },
        )
        .await
        .unwrap();
    assert_eq!(affected, 0);
    assert_eq!(backend.table_len("students"), 1);
}
