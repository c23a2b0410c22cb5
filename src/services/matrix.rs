use ndarray::Array2;
use std::collections::HashMap;

use super::interactions::InteractionTable;

/// Dense user x item rating matrix, 0 where a user has not liked an item
///
/// Row and column order is fixed at construction (first-seen order), so
/// anything derived from the matrix can be indexed with the same positions.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    users: Vec<String>,
    items: Vec<String>,
    user_index: HashMap<String, usize>,
    item_index: HashMap<String, usize>,
    ratings: Array2<f64>,
}

impl InteractionMatrix {
    pub fn from_table(table: &InteractionTable) -> Self {
        let users: Vec<String> = table.users().to_vec();
        let user_index: HashMap<String, usize> = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i))
            .collect();

        let mut items = Vec::new();
        let mut item_index = HashMap::new();
        for interaction in table.iter() {
            if !item_index.contains_key(&interaction.item_id) {
                item_index.insert(interaction.item_id.clone(), items.len());
                items.push(interaction.item_id.clone());
            }
        }

        let mut ratings = Array2::<f64>::zeros((users.len(), items.len()));
        for interaction in table.iter() {
            let row = user_index[&interaction.user_id];
            let col = item_index[&interaction.item_id];
            ratings[[row, col]] = interaction.implicit_rating;
        }

        Self {
            users,
            items,
            user_index,
            item_index,
            ratings,
        }
    }

    /// Builds a matrix directly, mainly for tests of downstream stages
    pub fn from_dense(users: Vec<String>, items: Vec<String>, ratings: Array2<f64>) -> Self {
        assert_eq!(ratings.dim(), (users.len(), items.len()));
        let user_index = users
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i))
            .collect();
        let item_index = items
            .iter()
            .enumerate()
            .map(|(i, u)| (u.clone(), i))
            .collect();
        Self {
            users,
            items,
            user_index,
            item_index,
            ratings,
        }
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn user_position(&self, user_id: &str) -> Option<usize> {
        self.user_index.get(user_id).copied()
    }

    pub fn item_position(&self, item_id: &str) -> Option<usize> {
        self.item_index.get(item_id).copied()
    }

    pub fn ratings(&self) -> &Array2<f64> {
        &self.ratings
    }

    pub fn rating(&self, user_id: &str, item_id: &str) -> f64 {
        match (self.user_position(user_id), self.item_position(item_id)) {
            (Some(row), Some(col)) => self.ratings[[row, col]],
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Interaction;

    fn interaction(user: &str, item: &str, rating: f64) -> Interaction {
        Interaction {
            user_id: user.to_string(),
            item_id: item.to_string(),
            implicit_rating: rating,
        }
    }

    #[test]
    fn test_pivot_fills_missing_with_zero() {
        let table = InteractionTable::from_interactions(vec![
            interaction("u1", "a", 5.0),
            interaction("u2", "b", 4.0),
            interaction("u2", "a", 3.0),
        ]);
        let matrix = InteractionMatrix::from_table(&table);

        assert_eq!(matrix.users(), &["u1".to_string(), "u2".to_string()]);
        assert_eq!(matrix.items(), &["a".to_string(), "b".to_string()]);
        assert_eq!(matrix.ratings().dim(), (2, 2));
        assert_eq!(matrix.rating("u1", "a"), 5.0);
        assert_eq!(matrix.rating("u1", "b"), 0.0);
        assert_eq!(matrix.rating("u2", "a"), 3.0);
        assert_eq!(matrix.rating("u2", "b"), 4.0);
    }

    #[test]
    fn test_every_user_and_item_has_a_position() {
        let table = InteractionTable::from_interactions(vec![
            interaction("u1", "a", 5.0),
            interaction("u2", "c", 5.0),
            interaction("u3", "b", 5.0),
        ]);
        let matrix = InteractionMatrix::from_table(&table);

        for user in ["u1", "u2", "u3"] {
            assert!(matrix.user_position(user).is_some());
        }
        for item in ["a", "b", "c"] {
            assert!(matrix.item_position(item).is_some());
        }
        assert_eq!(matrix.rating("missing", "a"), 0.0);
    }
}
