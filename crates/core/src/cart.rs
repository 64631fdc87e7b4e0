//! Shopping cart lines and the pure cart reducer.
//!
//! [`CartState`] holds no I/O: every mutation is a plain method on an owned
//! `Vec<CartLine>`. Persisting the result is the caller's job (see
//! `recipe_box_client::store::CartStore`), which keeps the merge rules
//! testable without a storage backend.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::IngredientId;

/// A quantity that is NaN or infinite, or a merge that would make one.
///
/// Such a value cannot be represented in the persisted JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Invalid quantity: {0} is not a finite number")]
pub struct InvalidQuantity(pub f64);

/// One ingredient-quantity pair held in the cart.
///
/// `ingredient_id` is the line's key: a cart never holds two lines with the
/// same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

impl CartLine {
    /// Create an unpriced line.
    #[must_use]
    pub fn new(
        ingredient_id: impl Into<IngredientId>,
        name: impl Into<String>,
        quantity: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            ingredient_id: ingredient_id.into(),
            name: name.into(),
            quantity,
            unit: unit.into(),
            price: None,
        }
    }

    /// Set the unit price.
    #[must_use]
    pub const fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// `price * quantity`, or `None` for unpriced lines and for totals
    /// outside the range of [`Decimal`].
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        let price = self.price?;
        let quantity = Decimal::from_f64(self.quantity)?;
        price.checked_mul(quantity)
    }
}

/// The cart contents, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CartState {
    lines: Vec<CartLine>,
}

impl CartState {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Add a line, merging with an existing line for the same ingredient.
    ///
    /// A merge adds `line.quantity` to the existing quantity and keeps the
    /// existing line's position, name, unit and price. A new ingredient is
    /// appended at the end.
    pub fn add(&mut self, line: CartLine) {
        match self
            .lines
            .iter_mut()
            .find(|existing| existing.ingredient_id == line.ingredient_id)
        {
            Some(existing) => existing.quantity += line.quantity,
            None => self.lines.push(line),
        }
    }

    /// [`add`](Self::add), refusing a non-finite quantity.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidQuantity`] when `line.quantity` or the merged quantity
    /// is NaN or infinite; the cart is left unchanged.
    pub fn try_add(&mut self, line: CartLine) -> Result<(), InvalidQuantity> {
        let merged = self
            .get(&line.ingredient_id)
            .map_or(line.quantity, |existing| existing.quantity + line.quantity);
        if !line.quantity.is_finite() {
            return Err(InvalidQuantity(line.quantity));
        }
        if !merged.is_finite() {
            return Err(InvalidQuantity(merged));
        }
        self.add(line);
        Ok(())
    }

    /// Remove the line for `ingredient_id`. Absent ids are a no-op.
    ///
    /// Returns whether a line was removed.
    pub fn remove(&mut self, ingredient_id: &IngredientId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| &line.ingredient_id != ingredient_id);
        self.lines.len() != before
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Number of distinct lines, not the sum of quantities.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.lines.len()
    }

    /// Sum of all line quantities.
    #[must_use]
    pub fn total_quantity(&self) -> f64 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Sum of `price * quantity` over priced lines.
    ///
    /// `None` when a priced line or the sum overflows [`Decimal`].
    #[must_use]
    pub fn subtotal(&self) -> Option<Decimal> {
        self.lines
            .iter()
            .filter(|line| line.price.is_some())
            .try_fold(Decimal::ZERO, |sum, line| sum.checked_add(line.line_total()?))
    }

    /// Look up the line for an ingredient.
    #[must_use]
    pub fn get(&self, ingredient_id: &IngredientId) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|line| &line.ingredient_id == ingredient_id)
    }

    /// The lines in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Consume the state and return its lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<CartLine> {
        self.lines
    }
}

impl From<Vec<CartLine>> for CartState {
    /// Build a cart from possibly unmerged lines, applying the merge rule to
    /// each in order.
    fn from(lines: Vec<CartLine>) -> Self {
        let mut state = Self::new();
        for line in lines {
            state.add(line);
        }
        state
    }
}
