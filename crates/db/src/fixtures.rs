use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use sqlx::Executor;

const SEED_RESTAURANT_ID: &str = "rest-demo-001";
const SEED_RESTAURANT_PHONE: &str = "+15550100";
const SEED_MENU_ITEM_COUNT: i64 = 7;
const SEED_SETTING_KEYS: &[&str] = &["GREETING", "REPROMPT", "GOODBYE"];

/// Deterministic demo dataset: one restaurant, a small categorized menu,
/// and the call prompts the driver needs.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset into the database. Re-runnable.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            restaurant_id: SEED_RESTAURANT_ID,
            restaurant_phone: SEED_RESTAURANT_PHONE,
            menu_item_count: SEED_MENU_ITEM_COUNT,
        })
    }

    /// Verify that the seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let restaurant_exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM restaurant WHERE id = ?1 AND phone_number = ?2)",
        )
        .bind(SEED_RESTAURANT_ID)
        .bind(SEED_RESTAURANT_PHONE)
        .fetch_one(pool)
        .await?;
        checks.push(("restaurant", restaurant_exists == 1));

        let menu_item_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM menu_item WHERE restaurant_id = ?1")
                .bind(SEED_RESTAURANT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("menu-items", menu_item_count == SEED_MENU_ITEM_COUNT));

        let orphaned_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM menu_item
             WHERE restaurant_id = ?1 AND category_id IS NOT NULL
               AND category_id NOT IN (SELECT id FROM category)",
        )
        .bind(SEED_RESTAURANT_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("menu-categories", orphaned_items == 0));

        for key in SEED_SETTING_KEYS {
            let setting_exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM admin_setting WHERE key = ?1 AND length(value) > 0)",
            )
            .bind(key)
            .fetch_one(pool)
            .await?;
            checks.push((*key, setting_exists == 1));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

pub struct SeedResult {
    pub restaurant_id: &'static str,
    pub restaurant_phone: &'static str,
    pub menu_item_count: i64,
}

pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
