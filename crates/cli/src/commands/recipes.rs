//! Recipe and favorite commands.

use recipe_box_client::AppState;
use recipe_box_client::store::RecipeFilter;
use recipe_box_core::search::{LocalSearch, contains_ignore_case};
use recipe_box_core::{CategoryId, Recipe, RecipeId};

/// List recipes, filtered server-side by `search`/`category` and then
/// locally by title.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn list(
    state: &AppState,
    search: Option<String>,
    category: Option<String>,
    local_filter: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = RecipeFilter {
        search,
        category_id: category.map(CategoryId::from),
    };
    state.recipes().get_recipes(&filter).await?;

    let mut listing = LocalSearch::new(state.recipes().recipes().await, |recipe: &Recipe, query: &str| {
        contains_ignore_case(&recipe.title, query)
    });
    if let Some(query) = local_filter {
        listing.set_search_query(query);
    }
    for recipe in listing.filtered_data() {
        print_line(&summary(recipe));
    }
    print_line(&format!("{} of {} recipes", listing.match_count(), listing.data().len()));
    Ok(())
}

/// Show one recipe with its ingredients and steps.
///
/// # Errors
///
/// Returns an error if the backend request fails.
pub async fn show(state: &AppState, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = state.recipes();
    store.get_recipe_by_id(&RecipeId::new(id)).await?;
    let Some(recipe) = store.active_recipe().await else {
        return Ok(());
    };

    print_line(&summary(&recipe));
    if let Some(description) = &recipe.description {
        print_line(description);
    }
    for ingredient in &recipe.ingredients {
        print_line(&format!(
            "  - {} {} {} ({})",
            ingredient.quantity, ingredient.unit, ingredient.name, ingredient.ingredient_id
        ));
    }
    for (number, step) in recipe.steps.iter().enumerate() {
        print_line(&format!("  {}. {step}", number + 1));
    }
    Ok(())
}

/// List recipes authored by the logged-in user.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn mine(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    state.recipes().get_my_recipes().await?;
    for recipe in state.recipes().my_recipes().await {
        print_line(&summary(&recipe));
    }
    Ok(())
}

/// Delete one of the user's recipes.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn delete(state: &AppState, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    state.recipes().delete_recipe(&RecipeId::new(id)).await?;
    tracing::info!(recipe_id = id, remaining = state.recipes().my_recipes().await.len(), "Recipe deleted");
    Ok(())
}

/// List favorites.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn favorites(state: &AppState) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    state.recipes().get_favorite_recipes().await?;
    for recipe in state.recipes().favorite_recipes().await {
        print_line(&summary(&recipe));
    }
    Ok(())
}

/// Add or remove a favorite.
///
/// # Errors
///
/// Returns an error if not logged in or the backend request fails.
pub async fn favorite(state: &AppState, id: &str, add: bool) -> Result<(), Box<dyn std::error::Error>> {
    state.auth().require_session().await?;
    let id = RecipeId::new(id);
    if add {
        state.recipes().add_favorite_recipe(&id).await?;
    } else {
        state.recipes().remove_favorite_recipe(&id).await?;
    }
    print_line(&format!(
        "{id} is {}a favorite",
        if state.recipes().is_favorite(&id).await { "" } else { "not " }
    ));
    Ok(())
}

fn summary(recipe: &Recipe) -> String {
    match recipe.prep_minutes {
        Some(minutes) => format!("[{}] {} ({minutes} min)", recipe.id, recipe.title),
        None => format!("[{}] {}", recipe.id, recipe.title),
    }
}

#[allow(clippy::print_stdout)]
fn print_line(line: &str) {
    println!("{line}");
}
