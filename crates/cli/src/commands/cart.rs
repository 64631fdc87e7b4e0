//! Cart commands.

use std::str::FromStr;

use recipe_box_client::AppState;
use recipe_box_core::{CartLine, IngredientId};
use rust_decimal::Decimal;
use tracing::info;

use super::CommandError;

/// Print the cart and its totals.
#[allow(clippy::print_stdout)]
pub async fn show(state: &AppState) {
    let cart = state.cart().cart().await;
    if cart.is_empty() {
        println!("Cart is empty");
        return;
    }
    for line in cart.lines() {
        let total = line
            .line_total()
            .map_or_else(String::new, |total| format!("  {total}"));
        println!("{:<12} {:<20} {} {}{total}", line.ingredient_id, line.name, line.quantity, line.unit);
    }
    let subtotal = cart
        .subtotal()
        .map_or_else(|| "out of range".to_string(), |subtotal| subtotal.to_string());
    println!(
        "{} lines, {} items, subtotal {subtotal}",
        cart.total_items(),
        cart.total_quantity(),
    );
}

/// Add an ingredient to the cart.
///
/// # Errors
///
/// Returns an error for a malformed price or if the cart cannot be saved.
pub async fn add(
    state: &AppState,
    id: String,
    name: String,
    quantity: f64,
    unit: String,
    price: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut line = CartLine::new(id, name, quantity, unit);
    if let Some(price) = price {
        let price =
            Decimal::from_str(price).map_err(|e| CommandError::InvalidPrice(format!("{price}: {e}")))?;
        line = line.with_price(price);
    }
    state.cart().add_to_cart(line).await?;
    show(state).await;
    Ok(())
}

/// Remove an ingredient from the cart.
///
/// # Errors
///
/// Returns an error if the cart cannot be saved.
pub async fn remove(state: &AppState, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    state.cart().remove_from_cart(&IngredientId::new(id)).await?;
    show(state).await;
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the cart cannot be saved.
pub async fn clear(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.cart().clear_cart().await?;
    info!("Cart cleared");
    Ok(())
}

/// Place an order for the cart.
///
/// # Errors
///
/// Returns an error if not logged in, the cart is empty or the order fails.
#[allow(clippy::print_stdout)]
pub async fn checkout(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    let order = state.cart().checkout().await?;
    match order.total {
        Some(total) => println!("Order {} placed ({:?}), total {total}", order.id, order.status),
        None => println!("Order {} placed ({:?})", order.id, order.status),
    }
    Ok(())
}
