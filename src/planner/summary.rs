use std::collections::BTreeMap;

use serde::Serialize;

use super::model::{AdditionalExpense, Ingredient};

pub const UNCATEGORIZED: &str = "Other";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ShoppingProgress {
    pub purchased: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpendSummary {
    pub shopping_total: f64,
    pub additional_total: f64,
    pub grand_total: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategorizedItem {
    /// Position in the flat shopping list.
    pub index: usize,
    #[serde(flatten)]
    pub item: Ingredient,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryGroup {
    pub category: String,
    pub items: Vec<CategorizedItem>,
}

pub fn progress(list: &[Ingredient]) -> ShoppingProgress {
    ShoppingProgress {
        purchased: list.iter().filter(|i| i.checked).count(),
        total: list.len(),
    }
}

pub fn spend(list: &[Ingredient], expenses: &[AdditionalExpense]) -> SpendSummary {
    let shopping_total: f64 = list.iter().map(|i| i.price.unwrap_or(0.0)).sum();
    let additional_total: f64 = expenses.iter().map(|e| e.price).sum();
    SpendSummary {
        shopping_total,
        additional_total,
        grand_total: shopping_total + additional_total,
    }
}

/// Groups items by category name, groups sorted by name.
pub fn group_by_category(list: &[Ingredient]) -> Vec<CategoryGroup> {
    let mut groups: BTreeMap<String, Vec<CategorizedItem>> = BTreeMap::new();
    for (index, item) in list.iter().enumerate() {
        let category = match item.category.trim() {
            "" => UNCATEGORIZED.to_string(),
            c => c.to_string(),
        };
        groups.entry(category).or_default().push(CategorizedItem {
            index,
            item: item.clone(),
        });
    }
    groups
        .into_iter()
        .map(|(category, items)| CategoryGroup { category, items })
        .collect()
}

#[cfg(test)]
mod summary_tests {
    use super::*;

    fn item(name: &str, category: &str, checked: bool, price: Option<f64>) -> Ingredient {
        Ingredient {
            name: name.into(),
            quantity: "1".into(),
            category: category.into(),
            checked,
            price,
            used_in: vec!["Soup".into()],
        }
    }

    #[test]
    fn totals_treat_missing_prices_as_zero() {
        let list = vec![
            item("egg", "Dairy", true, Some(2.5)),
            item("milk", "Dairy", false, None),
        ];
        let expenses = vec![AdditionalExpense::new("Soap".into(), 1.5)];
        let s = spend(&list, &expenses);
        assert_eq!(s.shopping_total, 2.5);
        assert_eq!(s.additional_total, 1.5);
        assert_eq!(s.grand_total, 4.0);
        assert_eq!(progress(&list), ShoppingProgress { purchased: 1, total: 2 });
    }

    #[test]
    fn groups_are_sorted_and_keep_list_index() {
        let list = vec![
            item("pork", "Meat", false, None),
            item("basil", "", false, None),
            item("garlic", "Herbs", false, None),
            item("chicken", "Meat", false, None),
        ];
        let groups = group_by_category(&list);
        let names: Vec<_> = groups.iter().map(|g| g.category.as_str()).collect();
        assert_eq!(names, vec!["Herbs", "Meat", UNCATEGORIZED]);
        let meat = &groups[1];
        assert_eq!(meat.items.iter().map(|i| i.index).collect::<Vec<_>>(), vec![0, 3]);
    }
}
