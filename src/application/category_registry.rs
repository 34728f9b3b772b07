use crate::domain::category_name::encode_category_name;
use crate::domain::models::{CategoryColorMap, EnsureCategoriesResult, RemoveCategoriesResult};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::preference_store::PreferenceStore;
use std::sync::Arc;

pub const CATEGORY_NAMES_KEY: &str = "calendar.categories.names";
const CATEGORY_COLOR_KEY_PREFIX: &str = "calendar.category.color.";
const LOG_SCOPE: &str = "category_registry";

pub fn category_color_key(name: &str) -> String {
    format!("{CATEGORY_COLOR_KEY_PREFIX}{}", encode_category_name(name))
}

/// Keeps the host's category registry (a color pref per category plus one
/// comma-joined list of display names) in line with the configured colors.
pub struct CategoryRegistry<P>
where
    P: PreferenceStore + ?Sized,
{
    preferences: Arc<P>,
    log: Arc<CommandLog>,
}

impl<P> CategoryRegistry<P>
where
    P: PreferenceStore + ?Sized,
{
    pub fn new(preferences: Arc<P>) -> Self {
        Self {
            preferences,
            log: Arc::new(CommandLog::disabled()),
        }
    }

    pub fn with_log(mut self, log: Arc<CommandLog>) -> Self {
        self.log = log;
        self
    }

    /// Creates or recolors every category in `colors`. Only an unwritable
    /// name list is reported as an error; per-category failures are logged.
    pub fn ensure_categories(
        &self,
        colors: &CategoryColorMap,
    ) -> Result<EnsureCategoriesResult, InfraError> {
        let mut names = self.read_names();
        let mut names_changed = false;
        let mut result = EnsureCategoriesResult {
            total: colors.len(),
            ..EnsureCategoriesResult::default()
        };

        for (name, color) in colors.iter() {
            if name.contains(',') {
                self.log.error(
                    LOG_SCOPE,
                    &format!("skipping category '{name}': ',' would split the name list"),
                );
                continue;
            }

            let key = category_color_key(name);
            let current_color = self.read_optional(&key);
            let name_listed = names.iter().any(|listed| listed == name);
            let color_matches = current_color.as_deref() == Some(color);

            if color_matches && name_listed {
                result.existing += 1;
                continue;
            }

            if !color_matches {
                if let Err(error) = self.preferences.set_string(&key, color) {
                    self.log.error(
                        LOG_SCOPE,
                        &format!("failed to set color for '{name}' ({key}): {error}"),
                    );
                    continue;
                }
                match current_color {
                    Some(previous) => self.log.info(
                        LOG_SCOPE,
                        &format!("color updated: {key} = {color} (was {previous})"),
                    ),
                    None => self.log.info(LOG_SCOPE, &format!("color set: {key} = {color}")),
                }
            }

            if !name_listed {
                names.push(name.to_string());
                names_changed = true;
            }
            result.created += 1;
        }

        if names_changed {
            self.write_names(&names)?;
        }

        self.log.info(
            LOG_SCOPE,
            &format!(
                "{} created, {} already existed, {} total",
                result.created, result.existing, result.total
            ),
        );
        Ok(result)
    }

    /// Drops the color pref and the list entry of each name. Events keep
    /// their category strings.
    pub fn remove_categories(&self, names_to_remove: &[String]) -> Result<RemoveCategoriesResult, InfraError> {
        let mut names = self.read_names();
        let mut result = RemoveCategoriesResult::default();

        for name in names_to_remove {
            let key = category_color_key(name);
            match self.preferences.clear(&key) {
                Ok(()) => result.removed_colors += 1,
                Err(error) => self.log.error(
                    LOG_SCOPE,
                    &format!("failed to clear color pref {key}: {error}"),
                ),
            }

            if let Some(index) = names.iter().position(|listed| listed == name) {
                names.remove(index);
                result.removed_names += 1;
            }
        }

        if result.removed_names > 0 {
            self.write_names(&names)?;
        }

        self.log.info(
            LOG_SCOPE,
            &format!(
                "removed {} colors, {} names",
                result.removed_colors, result.removed_names
            ),
        );
        Ok(result)
    }

    /// Display names currently known to the host.
    pub fn registered_names(&self) -> Vec<String> {
        self.read_names()
    }

    fn read_names(&self) -> Vec<String> {
        self.read_optional(CATEGORY_NAMES_KEY)
            .map(|raw| parse_name_list(&raw))
            .unwrap_or_default()
    }

    fn write_names(&self, names: &[String]) -> Result<(), InfraError> {
        self.preferences
            .set_string(CATEGORY_NAMES_KEY, &names.join(","))?;
        self.log.info(LOG_SCOPE, "updated category names list");
        Ok(())
    }

    fn read_optional(&self, key: &str) -> Option<String> {
        match self.preferences.get_string(key) {
            Ok(value) => value,
            Err(error) => {
                self.log
                    .error(LOG_SCOPE, &format!("treating {key} as absent: {error}"));
                None
            }
        }
    }
}

fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::preference_store::InMemoryPreferenceStore;
    use std::collections::HashSet;
    use std::sync::Mutex;

    fn colors(entries: &[(&str, &str)]) -> CategoryColorMap {
        entries.iter().copied().collect()
    }

    fn registry() -> (Arc<InMemoryPreferenceStore>, CategoryRegistry<InMemoryPreferenceStore>) {
        let store = Arc::new(InMemoryPreferenceStore::default());
        (Arc::clone(&store), CategoryRegistry::new(store))
    }

    /// Store whose reads or writes fail for selected keys.
    #[derive(Debug, Default)]
    struct FlakyPreferenceStore {
        inner: InMemoryPreferenceStore,
        failing_reads: Mutex<HashSet<String>>,
        failing_writes: Mutex<HashSet<String>>,
        failing_clears: Mutex<HashSet<String>>,
    }

    impl FlakyPreferenceStore {
        fn fails(set: &Mutex<HashSet<String>>, key: &str) -> bool {
            set.lock().expect("flaky set lock").contains(key)
        }
    }

    impl PreferenceStore for FlakyPreferenceStore {
        fn get_string(&self, key: &str) -> Result<Option<String>, InfraError> {
            if Self::fails(&self.failing_reads, key) {
                return Err(InfraError::Preference(format!("cannot read {key}")));
            }
            self.inner.get_string(key)
        }

        fn set_string(&self, key: &str, value: &str) -> Result<(), InfraError> {
            if Self::fails(&self.failing_writes, key) {
                return Err(InfraError::Preference(format!("cannot write {key}")));
            }
            self.inner.set_string(key, value)
        }

        fn clear(&self, key: &str) -> Result<(), InfraError> {
            if Self::fails(&self.failing_clears, key) {
                return Err(InfraError::Preference(format!("cannot clear {key}")));
            }
            self.inner.clear(key)
        }
    }

    #[test]
    fn ensure_creates_colors_and_name_list() {
        let (store, registry) = registry();
        let result = registry
            .ensure_categories(&colors(&[("Auslieferung", "#8B0000"), ("Rückgabe", "#FFD700")]))
            .expect("ensure categories");

        assert_eq!(
            result,
            EnsureCategoriesResult {
                created: 2,
                existing: 0,
                total: 2
            }
        );
        assert_eq!(
            store.get_string("calendar.category.color.auslieferung").expect("get"),
            Some("#8B0000".to_string())
        );
        assert_eq!(
            store.get_string("calendar.category.color.r-uxfc-ckgabe").expect("get"),
            Some("#FFD700".to_string())
        );
        assert_eq!(
            store.get_string(CATEGORY_NAMES_KEY).expect("get"),
            Some("Auslieferung,Rückgabe".to_string())
        );
    }

    #[test]
    fn second_ensure_reports_everything_existing() {
        let (_store, registry) = registry();
        let map = colors(&[("Ferien", "#800080"), ("Linth", "#0000FF")]);
        registry.ensure_categories(&map).expect("first ensure");

        let second = registry.ensure_categories(&map).expect("second ensure");
        assert_eq!(second.created, 0);
        assert_eq!(second.existing, second.total);
    }

    #[test]
    fn ensure_keeps_foreign_names_and_appends_missing() {
        let (store, registry) = registry();
        store
            .set_string(CATEGORY_NAMES_KEY, " Privat , ,Geburtstag")
            .expect("seed names");

        registry
            .ensure_categories(&colors(&[("Ferien", "#800080")]))
            .expect("ensure");

        assert_eq!(
            registry.registered_names(),
            vec!["Privat", "Geburtstag", "Ferien"]
        );
    }

    #[test]
    fn ensure_recolors_listed_category() {
        let (store, registry) = registry();
        registry
            .ensure_categories(&colors(&[("Linth", "#0000FF")]))
            .expect("first ensure");

        let result = registry
            .ensure_categories(&colors(&[("Linth", "#00FFFF")]))
            .expect("recolor");

        assert_eq!(result.created, 1);
        assert_eq!(
            store.get_string(&category_color_key("Linth")).expect("get"),
            Some("#00FFFF".to_string())
        );
        assert_eq!(registry.registered_names(), vec!["Linth"]);
    }

    #[test]
    fn name_lookup_is_case_sensitive() {
        let (store, registry) = registry();
        store.set_string(CATEGORY_NAMES_KEY, "ferien").expect("seed names");
        store
            .set_string(&category_color_key("Ferien"), "#800080")
            .expect("seed color");

        let result = registry
            .ensure_categories(&colors(&[("Ferien", "#800080")]))
            .expect("ensure");

        assert_eq!(result.created, 1);
        assert_eq!(registry.registered_names(), vec!["ferien", "Ferien"]);
    }

    #[test]
    fn unreadable_prefs_are_treated_as_absent() {
        let store = Arc::new(FlakyPreferenceStore::default());
        store
            .failing_reads
            .lock()
            .expect("lock")
            .insert(CATEGORY_NAMES_KEY.to_string());
        let registry = CategoryRegistry::new(Arc::clone(&store));

        let result = registry
            .ensure_categories(&colors(&[("Abholung", "#FF0000")]))
            .expect("ensure");

        assert_eq!(result.created, 1);
        assert_eq!(
            store.inner.get_string(CATEGORY_NAMES_KEY).expect("get"),
            Some("Abholung".to_string())
        );
    }

    #[test]
    fn failed_color_write_does_not_abort_other_entries() {
        let store = Arc::new(FlakyPreferenceStore::default());
        store
            .failing_writes
            .lock()
            .expect("lock")
            .insert(category_color_key("Abholung"));
        let registry = CategoryRegistry::new(Arc::clone(&store));

        let result = registry
            .ensure_categories(&colors(&[("Abholung", "#FF0000"), ("Ferien", "#800080")]))
            .expect("ensure");

        assert_eq!(result.created, 1);
        assert_eq!(result.total, 2);
        assert_eq!(registry.registered_names(), vec!["Ferien"]);
    }

    #[test]
    fn names_with_commas_are_skipped() {
        let (store, registry) = registry();
        let result = registry
            .ensure_categories(&colors(&[("Abholung, Lager", "#FF0000")]))
            .expect("ensure");

        assert_eq!(result.created, 0);
        assert_eq!(result.total, 1);
        assert_eq!(store.get_string(CATEGORY_NAMES_KEY).expect("get"), None);
    }

    #[test]
    fn remove_absent_category_counts_cleared_color_only() {
        let (_store, registry) = registry();
        let result = registry
            .remove_categories(&["Ferien".to_string()])
            .expect("remove");
        assert_eq!(
            result,
            RemoveCategoriesResult {
                removed_colors: 1,
                removed_names: 0
            }
        );
    }

    #[test]
    fn remove_drops_color_and_name() {
        let (store, registry) = registry();
        registry
            .ensure_categories(&colors(&[("Ferien", "#800080"), ("Linth", "#0000FF")]))
            .expect("ensure");

        let result = registry
            .remove_categories(&["Ferien".to_string()])
            .expect("remove");

        assert_eq!(result.removed_names, 1);
        assert_eq!(store.get_string(&category_color_key("Ferien")).expect("get"), None);
        assert_eq!(registry.registered_names(), vec!["Linth"]);
    }

    #[test]
    fn failed_clear_is_swallowed() {
        let store = Arc::new(FlakyPreferenceStore::default());
        store
            .failing_clears
            .lock()
            .expect("lock")
            .insert(category_color_key("Ferien"));
        store
            .inner
            .set_string(CATEGORY_NAMES_KEY, "Ferien,Linth")
            .expect("seed names");
        let registry = CategoryRegistry::new(Arc::clone(&store));

        let result = registry
            .remove_categories(&["Ferien".to_string(), "Linth".to_string()])
            .expect("remove");

        assert_eq!(result.removed_colors, 1);
        assert_eq!(result.removed_names, 2);
        assert_eq!(
            store.inner.get_string(CATEGORY_NAMES_KEY).expect("get"),
            Some(String::new())
        );
    }
}
