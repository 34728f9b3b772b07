use crate::domain::models::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Add the matched category when it is missing; keep the others.
    Normal,
    /// Replace the category set with the matched category, unconditionally.
    Force,
}

impl ApplyMode {
    pub fn from_force(force: bool) -> Self {
        if force { Self::Force } else { Self::Normal }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Force => "force",
        }
    }
}

/// First rule, in list order, whose keyword occurs in the title.
pub fn first_matching_rule<'a>(rules: &'a [Rule], title: &str) -> Option<&'a Rule> {
    if title.is_empty() {
        return None;
    }
    let lowered = title.to_lowercase();
    rules.iter().find(|rule| rule.matches(&lowered))
}

/// Category list the item should carry after `category` is applied, or
/// `None` when the item is already satisfied.
pub fn planned_categories(current: &[String], category: &str, mode: ApplyMode) -> Option<Vec<String>> {
    match mode {
        ApplyMode::Force => Some(vec![category.to_string()]),
        ApplyMode::Normal if current.iter().any(|existing| existing == category) => None,
        ApplyMode::Normal => {
            let mut updated = current.to_vec();
            updated.push(category.to_string());
            Some(updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn earlier_rule_wins_when_two_keywords_match() {
        let rules = vec![Rule::new("abholung", "Abholung"), Rule::new("ferien", "Ferien")];
        let matched = first_matching_rule(&rules, "Ferien nach Abholung").expect("rule matches");
        assert_eq!(matched.category, "Abholung");
    }

    #[test]
    fn empty_title_never_matches() {
        let rules = vec![Rule::new("", "Everything")];
        assert!(first_matching_rule(&rules, "").is_none());
    }

    #[test]
    fn normal_mode_appends_missing_category() {
        let planned = planned_categories(&strings(&["Privat"]), "Linth", ApplyMode::Normal);
        assert_eq!(planned, Some(strings(&["Privat", "Linth"])));
    }

    #[test]
    fn normal_mode_skips_present_category() {
        let planned = planned_categories(
            &strings(&["Auslieferung", "Privat"]),
            "Auslieferung",
            ApplyMode::Normal,
        );
        assert_eq!(planned, None);
    }

    #[test]
    fn force_mode_collapses_to_matched_category() {
        let planned = planned_categories(
            &strings(&["Auslieferung", "Privat"]),
            "Auslieferung",
            ApplyMode::Force,
        );
        assert_eq!(planned, Some(strings(&["Auslieferung"])));
    }

    proptest! {
        #[test]
        fn force_always_yields_single_category(
            current in proptest::collection::vec("[A-Za-z]{1,8}", 0..6),
            category in "[A-Za-z]{1,8}",
        ) {
            let planned = planned_categories(&current, &category, ApplyMode::Force);
            prop_assert_eq!(planned, Some(vec![category.clone()]));
        }

        #[test]
        fn normal_mode_is_idempotent(
            current in proptest::collection::vec("[A-Za-z]{1,8}", 0..6),
            category in "[A-Za-z]{1,8}",
        ) {
            let once = planned_categories(&current, &category, ApplyMode::Normal)
                .unwrap_or_else(|| current.clone());
            prop_assert!(planned_categories(&once, &category, ApplyMode::Normal).is_none());
        }

        #[test]
        fn first_rule_in_list_order_wins(
            prefix in "[a-z]{0,6}",
            first in "[a-z]{3,6}",
            second in "[a-z]{3,6}",
        ) {
            let title = format!("{prefix} {second} {first}");
            let rules = vec![Rule::new(first.clone(), "first"), Rule::new(second.clone(), "second")];
            let matched = first_matching_rule(&rules, &title).expect("both keywords occur");
            prop_assert_eq!(matched.category.as_str(), "first");
        }
    }
}
