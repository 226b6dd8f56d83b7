use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestaurantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuItemId(pub String);

/// One restaurant, addressed by the phone number callers dial. Menu data is
/// owned by the admin surface; the core only ever reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    pub phone_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
}

/// Read-model of one restaurant's menu, frozen for the duration of a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub restaurant_id: RestaurantId,
    pub items: Vec<MenuItem>,
}

const UNCATEGORIZED: &str = "Other";

impl Menu {
    pub fn item_names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }

    pub fn item_by_name(&self, name: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Content hash over the category/name/price triples, independent of
    /// storage order. Cached agent instructions are keyed on this.
    pub fn fingerprint(&self) -> String {
        let mut lines = self
            .items
            .iter()
            .map(|item| {
                format!(
                    "{}|{}|{}",
                    item.category.as_deref().unwrap_or(UNCATEGORIZED),
                    item.name,
                    item.price.normalize()
                )
            })
            .collect::<Vec<_>>();
        lines.sort();

        let mut hasher = blake3::Hasher::new();
        for line in &lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Markdown-ish rendering embedded into the agent instructions, grouped
    /// by category with stable ordering.
    pub fn render_for_instructions(&self) -> String {
        let mut sections: BTreeMap<&str, Vec<&MenuItem>> = BTreeMap::new();
        for item in &self.items {
            sections.entry(item.category.as_deref().unwrap_or(UNCATEGORIZED)).or_default().push(item);
        }

        let mut rendered = String::new();
        for (category, mut items) in sections {
            items.sort_by(|a, b| a.name.cmp(&b.name));
            rendered.push_str(&format!("**{category}:**\n"));
            for item in items {
                rendered.push_str(&format!("- {}: ${:.2}\n", item.name, item.price.round_dp(2)));
            }
            rendered.push('\n');
        }
        rendered
    }
}
