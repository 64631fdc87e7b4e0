//! Client-side search over an in-memory collection.
//!
//! [`filter_by_query`] is the stateless filter. [`LocalSearch`] wraps it with
//! the current query and memoizes the result until the data or the query
//! changes, which is what list screens bind to.

use std::cell::OnceCell;

/// Filter `data` by `query` using `predicate`, preserving the original order.
///
/// An empty query matches everything, so the whole of `data` is returned
/// rather than an empty result. Any other query, whitespace included, is
/// handed to `predicate` unchanged.
pub fn filter_by_query<'a, T, P>(data: &'a [T], query: &str, predicate: P) -> Vec<&'a T>
where
    P: Fn(&T, &str) -> bool,
{
    if query.is_empty() {
        return data.iter().collect();
    }
    data.iter().filter(|item| predicate(item, query)).collect()
}

/// Case-insensitive substring test, the usual building block for predicates.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A collection paired with a search query and a memoized filtered view.
///
/// ```
/// use recipe_box_core::search::{LocalSearch, contains_ignore_case};
///
/// let mut search = LocalSearch::new(
///     vec!["Apple", "Banana", "Apricot"],
///     |item: &&str, query: &str| contains_ignore_case(item, query),
/// );
/// assert_eq!(search.filtered_data().len(), 3);
///
/// search.set_search_query("ap");
/// assert_eq!(search.filtered_data(), vec![&"Apple", &"Apricot"]);
/// ```
pub struct LocalSearch<T, P> {
    data: Vec<T>,
    search_query: String,
    predicate: P,
    // Indices into `data`; reset whenever `data` or `search_query` changes.
    matches: OnceCell<Vec<usize>>,
}

impl<T, P> LocalSearch<T, P>
where
    P: Fn(&T, &str) -> bool,
{
    /// Create a search over `data` with an empty query.
    pub const fn new(data: Vec<T>, predicate: P) -> Self {
        Self {
            data,
            search_query: String::new(),
            predicate,
            matches: OnceCell::new(),
        }
    }

    /// The current query.
    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    /// Replace the query. Setting the same query keeps the memoized result.
    pub fn set_search_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        if query != self.search_query {
            self.search_query = query;
            self.matches = OnceCell::new();
        }
    }

    /// Replace the underlying collection.
    pub fn set_data(&mut self, data: Vec<T>) {
        self.data = data;
        self.matches = OnceCell::new();
    }

    /// The unfiltered collection.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Items matching the current query, in their original order.
    pub fn filtered_data(&self) -> Vec<&T> {
        self.matches
            .get_or_init(|| self.compute_matches())
            .iter()
            .filter_map(|&index| self.data.get(index))
            .collect()
    }

    /// Number of items matching the current query.
    pub fn match_count(&self) -> usize {
        self.matches.get_or_init(|| self.compute_matches()).len()
    }

    fn compute_matches(&self) -> Vec<usize> {
        let query = self.search_query.as_str();
        self.data
            .iter()
            .enumerate()
            .filter(|(_, item)| query.is_empty() || (self.predicate)(item, query))
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fruit {
        id: u32,
        name: &'static str,
    }

    fn fruits() -> Vec<Fruit> {
        vec![
            Fruit { id: 1, name: "Apple" },
            Fruit { id: 2, name: "Banana" },
            Fruit { id: 3, name: "Apricot" },
        ]
    }

    fn by_name(fruit: &Fruit, query: &str) -> bool {
        contains_ignore_case(fruit.name, query)
    }

    #[test]
    fn test_empty_query_passes_everything_through() {
        let data = fruits();
        let result = filter_by_query(&data, "", by_name);
        assert_eq!(result, data.iter().collect::<Vec<_>>());

    }

    #[test]
    fn test_whitespace_query_reaches_predicate() {
        let data = vec![
            Fruit { id: 1, name: "Passion fruit" },
            Fruit { id: 2, name: "Banana" },
        ];
        let ids: Vec<_> = filter_by_query(&data, " ", by_name)
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, [1]);

        let mut search = LocalSearch::new(data, by_name);
        search.set_search_query(" ");
        assert_eq!(search.match_count(), 1);
    }

    #[test]
    fn test_filter_is_stable_and_case_insensitive() {
        let data = fruits();
        let ids: Vec<_> = filter_by_query(&data, "ap", by_name)
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, [1, 3]);
    }

    #[test]
    fn test_no_matches_is_empty() {
        let data = fruits();
        assert!(filter_by_query(&data, "kiwi", by_name).is_empty());
    }

    #[test]
    fn test_local_search_recomputes_on_query_change() {
        let mut search = LocalSearch::new(fruits(), by_name);
        assert_eq!(search.match_count(), 3);

        search.set_search_query("BAN");
        let names: Vec<_> = search.filtered_data().iter().map(|f| f.name).collect();
        assert_eq!(names, ["Banana"]);
        assert_eq!(search.search_query(), "BAN");
    }

    #[test]
    fn test_local_search_recomputes_on_data_change() {
        let mut search = LocalSearch::new(fruits(), by_name);
        search.set_search_query("ap");
        assert_eq!(search.match_count(), 2);

        search.set_data(vec![Fruit { id: 9, name: "Grape" }]);
        let ids: Vec<_> = search.filtered_data().iter().map(|f| f.id).collect();
        assert_eq!(ids, [9]);
    }

    #[test]
    fn test_local_search_memoizes_until_inputs_change() {
        let calls = Cell::new(0_u32);
        let predicate = |fruit: &Fruit, query: &str| {
            calls.set(calls.get() + 1);
            by_name(fruit, query)
        };
        let mut search = LocalSearch::new(fruits(), predicate);
        search.set_search_query("a");

        let _ = search.filtered_data();
        let _ = search.filtered_data();
        assert_eq!(calls.get(), 3);

        search.set_search_query("a");
        let _ = search.filtered_data();
        assert_eq!(calls.get(), 3);

        search.set_search_query("b");
        let _ = search.filtered_data();
        assert_eq!(calls.get(), 6);
    }
}
