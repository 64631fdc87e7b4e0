//! Entity records mirrored from the backend.
//!
//! Every record uses the backend's `camelCase` JSON field names. Optional
//! fields default to `None` so older or partial server payloads still decode.

mod account;
mod catalog;
mod notification;
mod order;
mod recipe;

pub use account::User;
pub use catalog::{Category, Ingredient, Nutrition};
pub use notification::Notification;
pub use order::Order;
pub use recipe::{NewRecipe, Recipe, RecipeIngredient};
