use serde::{Deserialize, Serialize};

use crate::types::{CategoryId, IngredientId, RecipeId, UserId};

/// A recipe as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// One ingredient line inside a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Payload for creating or updating a recipe. The server assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecipe {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<CategoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub steps: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_recipe_decodes() {
        let recipe: Recipe =
            serde_json::from_value(serde_json::json!({"id": "r1", "title": "Soup"})).unwrap();
        assert_eq!(recipe.id.as_str(), "r1");
        assert!(recipe.ingredients.is_empty());
        assert!(recipe.image_url.is_none());
    }

    #[test]
    fn test_recipe_uses_camel_case() {
        let recipe: Recipe = serde_json::from_value(serde_json::json!({
            "id": "r2",
            "title": "Bread",
            "imageUrl": "https://img/bread.jpg",
            "prepMinutes": 90,
            "ingredients": [
                {"ingredientId": "flour", "name": "Flour", "quantity": 500.0, "unit": "g"}
            ]
        }))
        .unwrap();
        assert_eq!(recipe.prep_minutes, Some(90));
        assert_eq!(recipe.ingredients[0].ingredient_id.as_str(), "flour");

        let back = serde_json::to_value(&recipe).unwrap();
        assert!(back.get("imageUrl").is_some());
        assert!(back.get("description").is_none());
    }
}
