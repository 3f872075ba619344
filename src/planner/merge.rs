use std::collections::HashMap;

use super::model::{MealDay, MealSlot, PlannerSettings, DEFAULT_SERVINGS};

/// Collapses repeated day labels into one entry per day, keeping first-seen
/// order. For each (day, slot) the last non-empty meal wins.
pub fn merge_days(fragments: Vec<MealDay>) -> Vec<MealDay> {
    let mut merged: Vec<MealDay> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for fragment in fragments {
        let pos = match index.get(&fragment.day) {
            Some(&pos) => pos,
            None => {
                index.insert(fragment.day.clone(), merged.len());
                merged.push(MealDay::empty(fragment.day.clone()));
                merged.len() - 1
            }
        };
        let target = &mut merged[pos];
        let MealDay {
            breakfast,
            lunch,
            dinner,
            ..
        } = fragment;
        if breakfast.is_some() {
            target.breakfast = breakfast;
        }
        if lunch.is_some() {
            target.lunch = lunch;
        }
        if dinner.is_some() {
            target.dinner = dinner;
        }
    }
    merged
}

/// Shapes a generated plan to the request: one entry per requested date in
/// request order, only requested slots, every meal at default servings.
/// Dates the generator skipped become empty placeholder days.
pub fn align_to_settings(generated: Vec<MealDay>, settings: &PlannerSettings) -> Vec<MealDay> {
    let mut by_label: HashMap<String, MealDay> = merge_days(generated)
        .into_iter()
        .map(|d| (d.day.clone(), d))
        .collect();

    settings
        .dates
        .iter()
        .map(|date| {
            let label = date.to_string();
            let mut day = by_label
                .remove(&label)
                .unwrap_or_else(|| MealDay::empty(label.clone()));
            for slot in MealSlot::ALL {
                let entry = day.slot_mut(slot);
                if !settings.meals.contains(&slot) {
                    *entry = None;
                } else if let Some(meal) = entry {
                    meal.servings = DEFAULT_SERVINGS;
                }
            }
            day
        })
        .collect()
}

#[cfg(test)]
mod merge_tests {
    use super::*;
    use crate::planner::model::Meal;
    use proptest::prelude::*;
    use time::macros::date;

    fn day(label: &str, b: Option<&str>, l: Option<&str>, d: Option<&str>) -> MealDay {
        MealDay {
            day: label.into(),
            breakfast: b.map(Meal::named),
            lunch: l.map(Meal::named),
            dinner: d.map(Meal::named),
        }
    }

    #[test]
    fn fragments_of_the_same_day_are_combined() {
        let merged = merge_days(vec![
            day("Mon", None, Some("Soup"), None),
            day("Tue", Some("Toast"), None, None),
            day("Mon", None, None, Some("Curry")),
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], day("Mon", None, Some("Soup"), Some("Curry")));
        assert_eq!(merged[1].day, "Tue");
    }

    #[test]
    fn later_fragment_wins_per_slot() {
        let merged = merge_days(vec![
            day("Mon", None, Some("Soup"), None),
            day("Mon", None, Some("Salad"), None),
            day("Mon", None, None, None),
        ]);
        assert_eq!(merged, vec![day("Mon", None, Some("Salad"), None)]);
    }

    #[test]
    fn alignment_fills_missing_dates_and_drops_unrequested_slots() {
        let settings = PlannerSettings {
            dates: vec![date!(2024 - 05 - 06), date!(2024 - 05 - 08)],
            meals: vec![MealSlot::Lunch, MealSlot::Dinner],
        };
        let mut generated = day("2024-05-06", Some("Porridge"), Some("Soup"), Some("Curry"));
        generated.lunch.as_mut().unwrap().servings = 5;
        let plan = align_to_settings(
            vec![generated, day("2024-05-09", None, Some("Extra"), None)],
            &settings,
        );

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].day, "2024-05-06");
        assert!(plan[0].breakfast.is_none());
        assert_eq!(plan[0].lunch.as_ref().unwrap().servings, DEFAULT_SERVINGS);
        assert_eq!(plan[0].dinner.as_ref().unwrap().name, "Curry");
        assert_eq!(plan[1], MealDay::empty("2024-05-08"));
    }

    fn fragment_strategy() -> impl Strategy<Value = MealDay> {
        (
            prop_oneof![Just("Mon"), Just("Tue"), Just("Wed")],
            proptest::option::of("[a-z]{1,6}"),
            proptest::option::of("[a-z]{1,6}"),
            proptest::option::of("[a-z]{1,6}"),
        )
            .prop_map(|(label, b, l, d)| MealDay {
                day: label.to_string(),
                breakfast: b.map(Meal::named),
                lunch: l.map(Meal::named),
                dinner: d.map(Meal::named),
            })
    }

    /// Requested dates and slots plus generator output that may skip, repeat
    /// or invent days.
    fn alignment_case() -> impl Strategy<Value = (PlannerSettings, Vec<MealDay>)> {
        let base = date!(2024 - 05 - 06);
        let name = || proptest::option::of("[a-z]{1,6}");
        (
            proptest::collection::vec(0i64..14, 1..6),
            proptest::sample::subsequence(MealSlot::ALL.to_vec(), 1..=3),
            proptest::collection::vec((0i64..20, name(), name(), name()), 0..16),
        )
            .prop_map(move |(offsets, meals, fragments)| {
                let settings = PlannerSettings {
                    dates: offsets
                        .into_iter()
                        .map(|o| base + time::Duration::days(o))
                        .collect(),
                    meals,
                }
                .normalized();
                let generated = fragments
                    .into_iter()
                    .map(|(o, b, l, d)| MealDay {
                        day: (base + time::Duration::days(o)).to_string(),
                        breakfast: b.map(Meal::named),
                        lunch: l.map(Meal::named),
                        dinner: d.map(Meal::named),
                    })
                    .collect();
                (settings, generated)
            })
    }

    proptest! {
        #[test]
        fn aligned_plan_follows_requested_dates_and_slots((settings, generated) in alignment_case()) {
            let plan = align_to_settings(generated, &settings);
            prop_assert_eq!(plan.len(), settings.dates.len());
            for (day, date) in plan.iter().zip(&settings.dates) {
                prop_assert_eq!(&day.day, &date.to_string());
                for slot in MealSlot::ALL {
                    if let Some(meal) = day.slot(slot) {
                        prop_assert!(settings.meals.contains(&slot));
                        prop_assert_eq!(meal.servings, DEFAULT_SERVINGS);
                    }
                }
            }
        }

        #[test]
        fn merging_is_idempotent(fragments in proptest::collection::vec(fragment_strategy(), 0..12)) {
            let once = merge_days(fragments);
            let twice = merge_days(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn merged_labels_are_unique(fragments in proptest::collection::vec(fragment_strategy(), 0..12)) {
            let merged = merge_days(fragments);
            let mut labels: Vec<_> = merged.iter().map(|d| d.day.clone()).collect();
            let before = labels.len();
            labels.dedup();
            labels.sort();
            labels.dedup();
            prop_assert_eq!(before, labels.len());
        }
    }
}
