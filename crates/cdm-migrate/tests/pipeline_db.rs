//! Database integration tests
//!
//! These tests require a PostgreSQL database. Point `CDM_TEST_DATABASE_URL`
//! at a scratch database (it doubles as source, staging and destination)
//! and run with:
//!
//! cargo test --test pipeline_db -- --ignored

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use cdm_migrate::db;
use cdm_migrate::extract::Extractor;
use cdm_migrate::identifiers::IdentifierAssigner;
use cdm_migrate::load::Loader;
use cdm_migrate::mapping::MappingDocument;
use cdm_migrate::models::{CustomerIdentifiers, StagedCustomer};
use cdm_migrate::schema::ensure_staging_schema;
use cdm_migrate::transform::Transformer;

/// Helper to create a test database pool
async fn create_test_pool() -> PgPool {
    let database_url = std::env::var("CDM_TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/cdm_test".to_string());

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    db::health_check(&pool)
        .await
        .expect("Test database must answer queries");
    pool
}

/// Create the fake source table and the destination tables, then empty
/// everything so each test starts clean
async fn reset_stores(pool: &PgPool) {
    ensure_staging_schema(pool)
        .await
        .expect("Failed to ensure staging schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS efz_customers (
            customer_code       BIGINT PRIMARY KEY,
            customer_name       TEXT NOT NULL,
            customer_type       TEXT NOT NULL,
            email               TEXT,
            phone_number        TEXT,
            address_line        TEXT,
            city                TEXT,
            state               TEXT,
            country             TEXT,
            date_of_birth       TEXT,
            gender              TEXT,
            bvn                 TEXT,
            registration_number TEXT,
            tax_id              TEXT,
            branch_code         TEXT,
            account_officer     TEXT,
            status              TEXT,
            is_pep              TEXT,
            created_at          TIMESTAMPTZ NOT NULL,
            updated_at          TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .expect("Failed to create source table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customer (
            "customerId"     UUID PRIMARY KEY,
            "customerNumber" TEXT,
            "fullName"       TEXT,
            "customerType"   TEXT,
            "email"          TEXT,
            "phoneNumber"    TEXT,
            "branchCode"     BIGINT,
            "accountOfficer" TEXT,
            "status"         TEXT,
            "tenantId"       UUID,
            "createdAt"      TIMESTAMPTZ,
            "updatedAt"      TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .expect("Failed to create customer table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS customer_profile (
            "customerProfileId"   UUID PRIMARY KEY,
            "customerId"          UUID,
            "customerNumber"      TEXT,
            "bvn"                 TEXT,
            "createdAt"           TIMESTAMPTZ,
            "updatedAt"           TIMESTAMPTZ,
            "customerProfileData" JSONB
        )
        "#,
    )
    .execute(pool)
    .await
    .expect("Failed to create customer_profile table");

    for table in [
        "efz_customers",
        "stg_customers",
        "customer_uuids",
        "ingestion_incremental_log",
        "customer",
        "customer_profile",
    ] {
        sqlx::query(&format!("TRUNCATE TABLE {table}"))
            .execute(pool)
            .await
            .expect("Failed to truncate table");
    }
}

fn at(instant: &str) -> DateTime<Utc> {
    instant.parse().expect("valid RFC 3339 instant")
}

/// Baseline row; tests fill in what they assert on
fn staged(code: i64, name: &str, customer_type: &str, created_at: &str) -> StagedCustomer {
    StagedCustomer {
        customer_code: code,
        customer_name: name.to_string(),
        customer_type: customer_type.to_string(),
        email: None,
        phone_number: None,
        address_line: None,
        city: None,
        state: None,
        country: None,
        date_of_birth: None,
        gender: None,
        bvn: None,
        registration_number: None,
        tax_id: None,
        branch_code: None,
        account_officer: None,
        status: None,
        is_pep: None,
        created_at: at(created_at),
        updated_at: None,
    }
}

/// Insert one row into the named customer-shaped table
async fn insert_row(pool: &PgPool, table: &str, row: &StagedCustomer) {
    let sql = format!(
        "INSERT INTO {table} (customer_code, customer_name, customer_type, email, phone_number, \
         address_line, city, state, country, date_of_birth, gender, bvn, registration_number, \
         tax_id, branch_code, account_officer, status, is_pep, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20)"
    );

    sqlx::query(&sql)
        .bind(row.customer_code)
        .bind(&row.customer_name)
        .bind(&row.customer_type)
        .bind(&row.email)
        .bind(&row.phone_number)
        .bind(&row.address_line)
        .bind(&row.city)
        .bind(&row.state)
        .bind(&row.country)
        .bind(&row.date_of_birth)
        .bind(&row.gender)
        .bind(&row.bvn)
        .bind(&row.registration_number)
        .bind(&row.tax_id)
        .bind(&row.branch_code)
        .bind(&row.account_officer)
        .bind(&row.status)
        .bind(&row.is_pep)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(pool)
        .await
        .expect("Failed to insert test row");
}

async fn fetch_staged(pool: &PgPool) -> Vec<StagedCustomer> {
    sqlx::query_as::<_, StagedCustomer>(
        "SELECT customer_code, customer_name, customer_type, email, phone_number, address_line, \
         city, state, country, date_of_birth, gender, bvn, registration_number, tax_id, \
         branch_code, account_officer, status, is_pep, created_at, updated_at \
         FROM stg_customers ORDER BY customer_code",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to read staged rows")
}

async fn recorded_watermark(pool: &PgPool) -> Option<DateTime<Utc>> {
    sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT last_ingested_at FROM ingestion_incremental_log WHERE table_name = 'stg_customers'",
    )
    .fetch_optional(pool)
    .await
    .expect("Failed to read watermark")
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows")
}

/// Assign identifiers, transform everything staged and upsert both tables
async fn transform_and_load(pool: &PgPool) -> HashMap<i64, CustomerIdentifiers> {
    let assigner = IdentifierAssigner::new(pool.clone());
    assigner
        .ensure_coverage()
        .await
        .expect("Failed to assign identifiers");
    let identifiers = assigner
        .fetch_mappings()
        .await
        .expect("Failed to fetch identifiers");

    let mapping = MappingDocument::builtin().expect("builtin mapping must parse");
    let transformer = Transformer::new(mapping.clone());
    let rows = fetch_staged(pool).await;
    let outcome = transformer.transform_batch(&rows, &identifiers);
    assert_eq!(outcome.skipped, 0, "no staged row should be skipped");

    let loader = Loader::new(pool.clone(), 500);
    loader
        .upsert_customers(&outcome.customers, &mapping.customer_columns())
        .await
        .expect("Failed to upsert customers");
    loader
        .upsert_profiles(&outcome.profiles, &mapping.profile_columns())
        .await
        .expect("Failed to upsert profiles");

    identifiers
}

#[tokio::test]
#[serial]
#[ignore] // Requires database
async fn test_identifier_assignment_is_idempotent_and_stable() {
    let pool = create_test_pool().await;
    reset_stores(&pool).await;

    for code in [101, 102, 103] {
        insert_row(
            &pool,
            "stg_customers",
            &staged(code, "Ada Obi", "Individual", "2024-01-01T00:00:00Z"),
        )
        .await;
    }

    let assigner = IdentifierAssigner::new(pool.clone());
    let inserted = assigner.ensure_coverage().await.expect("first assignment");
    assert_eq!(inserted, 3);

    let first = assigner.fetch_mappings().await.expect("first fetch");
    assert_eq!(first.len(), 3);

    let distinct: HashSet<Uuid> = first
        .values()
        .flat_map(|ids| [ids.customer_id, ids.customer_profile_id])
        .collect();
    assert_eq!(distinct.len(), 6, "identifier pairs must not collide");

    // A re-run assigns nothing new and changes nothing
    let inserted = assigner.ensure_coverage().await.expect("second assignment");
    assert_eq!(inserted, 0);

    insert_row(
        &pool,
        "stg_customers",
        &staged(104, "Chinedu Eze", "Individual", "2024-01-02T00:00:00Z"),
    )
    .await;
    let inserted = assigner.ensure_coverage().await.expect("third assignment");
    assert_eq!(inserted, 1);

    let second = assigner.fetch_mappings().await.expect("second fetch");
    assert_eq!(second.len(), 4);
    for (code, ids) in &first {
        assert_eq!(second[code], *ids, "existing pairs must never regenerate");
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires database
async fn test_full_then_incremental_extraction() {
    let pool = create_test_pool().await;
    reset_stores(&pool).await;

    insert_row(
        &pool,
        "efz_customers",
        &staged(1, "Ada Obi", "Individual", "2024-01-01T00:00:00Z"),
    )
    .await;
    insert_row(
        &pool,
        "efz_customers",
        &staged(2, "Acme Traders Ltd", "SME", "2024-01-01T08:00:00Z"),
    )
    .await;

    let extractor = Extractor::new(pool.clone(), pool.clone(), 500);

    let stats = extractor.full_load().await.expect("full load");
    assert_eq!(stats.extracted, 2);
    assert_eq!(stats.watermark, Some(at("2024-01-01T08:00:00Z")));
    assert_eq!(count(&pool, "stg_customers").await, 2);

    // Full extraction does not touch the watermark log
    assert_eq!(recorded_watermark(&pool).await, None);

    insert_row(
        &pool,
        "efz_customers",
        &staged(3, "Kano Mills Plc", "SME", "2024-02-01T00:00:00Z"),
    )
    .await;

    // First incremental falls back to the staged high-watermark
    let stats = extractor.incremental_load().await.expect("incremental load");
    assert_eq!(stats.extracted, 1);
    assert_eq!(stats.watermark, Some(at("2024-02-01T00:00:00Z")));
    assert_eq!(count(&pool, "stg_customers").await, 3);
    assert_eq!(
        recorded_watermark(&pool).await,
        Some(at("2024-02-01T00:00:00Z"))
    );

    // Nothing new: nothing staged, watermark unchanged
    let stats = extractor.incremental_load().await.expect("empty incremental");
    assert_eq!(stats.extracted, 0);
    assert_eq!(count(&pool, "stg_customers").await, 3);
    assert_eq!(
        recorded_watermark(&pool).await,
        Some(at("2024-02-01T00:00:00Z"))
    );
}

#[tokio::test]
#[serial]
#[ignore] // Requires database
async fn test_transform_load_converges_on_rerun() {
    let pool = create_test_pool().await;
    reset_stores(&pool).await;

    let mut ada = staged(101, "Ada Obi", "Individual", "2024-01-01T00:00:00Z");
    ada.phone_number = Some("555-1234".to_string());
    ada.branch_code = Some("0042".to_string());
    ada.bvn = Some("22334455667".to_string());
    ada.date_of_birth = Some("1990-04-16".to_string());
    ada.is_pep = Some("N".to_string());
    insert_row(&pool, "stg_customers", &ada).await;

    let mut acme = staged(202, "Acme Traders Ltd", "SME", "2024-01-02T00:00:00Z");
    acme.registration_number = Some("RC-445566".to_string());
    insert_row(&pool, "stg_customers", &acme).await;

    let identifiers = transform_and_load(&pool).await;

    assert_eq!(count(&pool, "customer").await, 2);
    assert_eq!(count(&pool, "customer_profile").await, 2);

    let email: Option<String> =
        sqlx::query_scalar(r#"SELECT "email" FROM customer WHERE "customerNumber" = '101'"#)
            .fetch_one(&pool)
            .await
            .expect("read email");
    assert_eq!(email.as_deref(), Some(""));

    let branch: Option<i64> =
        sqlx::query_scalar(r#"SELECT "branchCode" FROM customer WHERE "customerNumber" = '101'"#)
            .fetch_one(&pool)
            .await
            .expect("read branch code");
    assert_eq!(branch, Some(42));

    let business: Option<String> = sqlx::query_scalar(
        r#"SELECT "customerProfileData"->>'businessName' FROM customer_profile
           WHERE "customerNumber" = '202'"#,
    )
    .fetch_one(&pool)
    .await
    .expect("read business name");
    assert_eq!(business.as_deref(), Some("Acme Traders Ltd"));

    // Amend the staged row and re-run: same key, replaced values
    sqlx::query(
        "UPDATE stg_customers SET customer_name = 'Ada Obi-Benson', \
         email = 'ada@new.example' WHERE customer_code = 101",
    )
    .execute(&pool)
    .await
    .expect("amend staged row");

    let rerun_identifiers = transform_and_load(&pool).await;
    assert_eq!(rerun_identifiers[&101], identifiers[&101]);

    assert_eq!(count(&pool, "customer").await, 2);
    let name: Option<String> =
        sqlx::query_scalar(r#"SELECT "fullName" FROM customer WHERE "customerNumber" = '101'"#)
            .fetch_one(&pool)
            .await
            .expect("read name");
    assert_eq!(name.as_deref(), Some("Ada Obi-Benson"));

    let email: Option<String> =
        sqlx::query_scalar(r#"SELECT "email" FROM customer WHERE "customerNumber" = '101'"#)
            .fetch_one(&pool)
            .await
            .expect("read amended email");
    assert_eq!(email.as_deref(), Some("ada@new.example"));
}

#[tokio::test]
#[serial]
#[ignore] // Requires database
async fn test_profile_replace_clears_other_type_columns() {
    let pool = create_test_pool().await;
    reset_stores(&pool).await;

    let mut row = staged(301, "Binta Musa", "Individual", "2024-01-01T00:00:00Z");
    row.bvn = Some("99887766554".to_string());
    insert_row(&pool, "stg_customers", &row).await;

    transform_and_load(&pool).await;

    let bvn: Option<String> =
        sqlx::query_scalar(r#"SELECT "bvn" FROM customer_profile WHERE "customerNumber" = '301'"#)
            .fetch_one(&pool)
            .await
            .expect("read bvn");
    assert_eq!(bvn.as_deref(), Some("99887766554"));

    // The customer re-registers as a business; the individual-only column
    // must clear on replace
    sqlx::query(
        "UPDATE stg_customers SET customer_type = 'SME', bvn = NULL, \
         registration_number = 'RC-9001' WHERE customer_code = 301",
    )
    .execute(&pool)
    .await
    .expect("amend staged row");

    transform_and_load(&pool).await;

    assert_eq!(count(&pool, "customer_profile").await, 1);
    let bvn: Option<String> =
        sqlx::query_scalar(r#"SELECT "bvn" FROM customer_profile WHERE "customerNumber" = '301'"#)
            .fetch_one(&pool)
            .await
            .expect("read cleared bvn");
    assert_eq!(bvn, None);

    let registration: Option<String> = sqlx::query_scalar(
        r#"SELECT "customerProfileData"->>'registrationNumber' FROM customer_profile
           WHERE "customerNumber" = '301'"#,
    )
    .fetch_one(&pool)
    .await
    .expect("read registration");
    assert_eq!(registration.as_deref(), Some("RC-9001"));
}
