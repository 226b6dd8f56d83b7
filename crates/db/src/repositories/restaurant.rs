use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use orderline_core::domain::restaurant::{
    Menu, MenuItem, MenuItemId, Restaurant, RestaurantId,
};

use super::{RepositoryError, RestaurantRepository};
use crate::DbPool;

pub struct SqlRestaurantRepository {
    pool: DbPool,
}

impl SqlRestaurantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RestaurantRepository for SqlRestaurantRepository {
    async fn find_by_phone(
        &self,
        phone_number: &str,
    ) -> Result<Option<Restaurant>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, phone_number
            FROM restaurant
            WHERE phone_number = ?1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|value| Restaurant {
            id: RestaurantId(value.get("id")),
            name: value.get("name"),
            phone_number: value.get("phone_number"),
        }))
    }

    async fn menu(&self, restaurant_id: &RestaurantId) -> Result<Menu, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                menu_item.id, menu_item.restaurant_id, menu_item.name,
                menu_item.price, category.name AS category_name
            FROM menu_item
            LEFT JOIN category ON category.id = menu_item.category_id
            WHERE menu_item.restaurant_id = ?1
            ORDER BY menu_item.name ASC, menu_item.id ASC
            "#,
        )
        .bind(&restaurant_id.0)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(menu_item_from_row)
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Menu { restaurant_id: restaurant_id.clone(), items })
    }
}

fn menu_item_from_row(row: &SqliteRow) -> Result<MenuItem, RepositoryError> {
    let price_text: String = row.get("price");
    let price = Decimal::from_str(&price_text)
        .map_err(|error| RepositoryError::Decode(format!("menu_item.price: {error}")))?;

    Ok(MenuItem {
        id: MenuItemId(row.get("id")),
        restaurant_id: RestaurantId(row.get("restaurant_id")),
        name: row.get("name"),
        price,
        category: row.get::<Option<String>, _>("category_name"),
    })
}
