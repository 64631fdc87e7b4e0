//! Listing commands for the generic entity collections.

use std::fmt::Display;

use recipe_box_client::AppState;
use recipe_box_client::store::{Entity, EntityStore};
use recipe_box_core::NotificationId;

/// Fetch a collection and print one line per record.
async fn list<E, F, L>(store: &EntityStore<E>, label: F) -> Result<(), Box<dyn std::error::Error>>
where
    E: Entity,
    F: Fn(&E) -> L,
    L: Display,
{
    store.get_all().await?;
    print_lines(store.items().await.iter().map(|item| format!("[{}] {}", item.id(), label(item))));
    Ok(())
}

/// List ingredients.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn ingredients(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    list(state.ingredients(), |ingredient| match ingredient.price {
        Some(price) => format!("{} ({}) {price}", ingredient.name, ingredient.unit),
        None => format!("{} ({})", ingredient.name, ingredient.unit),
    })
    .await
}

/// List categories.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn categories(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    list(state.categories(), |category| category.name.clone()).await
}

/// List nutrition facts.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn nutrition(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    list(state.nutrition(), |facts| {
        format!(
            "{} kcal, protein {}, carbs {}, fat {}",
            facts.calories.unwrap_or_default(),
            facts.protein.unwrap_or_default(),
            facts.carbs.unwrap_or_default(),
            facts.fat.unwrap_or_default()
        )
    })
    .await
}

/// List the user's orders.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn orders(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    list(state.orders(), |order| format!("{:?}, {} lines", order.status, order.lines.len())).await
}

/// List notifications with an unread count.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn notifications(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    let store = state.notifications();
    list(store, |notification| {
        let marker = if notification.read { "" } else { " (unread)" };
        format!("{}{marker}", notification.title)
    })
    .await?;
    print_lines([format!("{} unread", store.unread_count().await)]);
    Ok(())
}

/// Mark a notification as read.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn mark_read(state: &AppState, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    state.notifications().mark_read(&NotificationId::new(id)).await?;
    print_lines([format!("{} unread", state.notifications().unread_count().await)]);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_lines(lines: impl IntoIterator<Item = String>) {
    for line in lines {
        println!("{line}");
    }
}
