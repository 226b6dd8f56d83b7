pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod transcript;

pub use catalog::{CatalogMatch, CatalogResolver, DEFAULT_MATCH_THRESHOLD};
pub use domain::order::{
    CallId, FulfillmentType, Order, OrderId, OrderItem, OrderStatus,
};
pub use domain::restaurant::{
    Category, CategoryId, Menu, MenuItem, MenuItemId, Restaurant, RestaurantId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use transcript::{ToolOutcomeKind, TranscriptEntry, TranscriptEvent};

pub use chrono;
