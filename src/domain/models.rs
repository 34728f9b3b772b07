use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_DAYS_BACK: u32 = 1;
pub const DEFAULT_DAYS_FORWARD: u32 = 90;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

const DEFAULT_CATEGORIES: [(&str, &str); 6] = [
    ("Auslieferung", "#8B0000"),
    ("Abholung", "#FF0000"),
    ("Rückgabe", "#FFD700"),
    ("Rücknahme", "#FFFF00"),
    ("Ferien", "#800080"),
    ("Linth", "#0000FF"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub keyword: String,
    pub category: String,
}

impl Rule {
    pub fn new(keyword: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            category: category.into(),
        }
    }

    /// `lowered_title` must already be lowercased.
    pub fn matches(&self, lowered_title: &str) -> bool {
        lowered_title.contains(&self.keyword.to_lowercase())
    }
}

/// Category display name to color, in insertion order.
///
/// Order is significant: rules are derived from it and the first matching
/// rule wins, so (de)serialization keeps the JSON object's key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryColorMap {
    entries: Vec<(String, String)>,
}

impl CategoryColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, color)| color.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces the color in place when the name exists, otherwise appends.
    pub fn insert(&mut self, name: impl Into<String>, color: impl Into<String>) -> Option<String> {
        let name = name.into();
        let color = color.into();
        if let Some((_, existing)) = self.entries.iter_mut().find(|(candidate, _)| *candidate == name) {
            return Some(std::mem::replace(existing, color));
        }
        self.entries.push((name, color));
        None
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.entries.iter().position(|(candidate, _)| candidate == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, color)| (name.as_str(), color.as_str()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl<N, C> FromIterator<(N, C)> for CategoryColorMap
where
    N: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, color) in iter {
            map.insert(name, color);
        }
        map
    }
}

impl Serialize for CategoryColorMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, color) in &self.entries {
            map.serialize_entry(name, color)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CategoryColorMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CategoryColorMapVisitor;

        impl<'de> Visitor<'de> for CategoryColorMapVisitor {
            type Value = CategoryColorMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an object mapping category names to colors")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = CategoryColorMap::new();
                while let Some((name, color)) = access.next_entry::<String, String>()? {
                    map.insert(name, color);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(CategoryColorMapVisitor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AutotagConfig {
    pub categories: CategoryColorMap,
    pub days_back: u32,
    pub days_forward: u32,
    pub interval_minutes: u32,
    pub full_width_colors: bool,
}

impl Default for AutotagConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.into_iter().collect(),
            days_back: DEFAULT_DAYS_BACK,
            days_forward: DEFAULT_DAYS_FORWARD,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            full_width_colors: true,
        }
    }
}

impl AutotagConfig {
    /// One rule per configured category; the keyword is the category name.
    pub fn rules(&self) -> Vec<Rule> {
        self.categories
            .iter()
            .map(|(name, _)| Rule::new(name, name))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, color) in self.categories.iter() {
            validate_category_name(name)?;
            validate_color(color, name)?;
        }
        Ok(())
    }

    pub fn add_category(&mut self, keyword: &str, color: &str) -> Result<String, String> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err("keyword must not be empty".to_string());
        }
        if self.categories.contains(keyword) {
            return Err(format!("keyword already exists: {keyword}"));
        }
        validate_category_name(keyword)?;
        validate_color(color, keyword)?;
        self.categories.insert(keyword, color);
        Ok(keyword.to_string())
    }

    pub fn remove_category(&mut self, keyword: &str) -> bool {
        self.categories.remove(keyword).is_some()
    }

    pub fn set_color(&mut self, keyword: &str, color: &str) -> Result<(), String> {
        if !self.categories.contains(keyword) {
            return Err(format!("unknown keyword: {keyword}"));
        }
        validate_color(color, keyword)?;
        self.categories.insert(keyword, color);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanDetail {
    pub title: String,
    pub category: String,
    pub calendar: String,
}

/// Outcome of one scan. A new value is created per scan and replaces the
/// previous one; results are never merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub processed: usize,
    pub modified: usize,
    pub last_run: Option<DateTime<Utc>>,
    pub details: Vec<ScanDetail>,
}

impl ScanResult {
    pub fn started_at(now: DateTime<Utc>) -> Self {
        Self {
            last_run: Some(now),
            ..Self::default()
        }
    }

    pub fn record_processed(&mut self) {
        self.processed += 1;
    }

    pub fn record_modified(&mut self, title: &str, category: &str, calendar: &str) {
        self.modified += 1;
        self.details.push(ScanDetail {
            title: title.to_string(),
            category: category.to_string(),
            calendar: calendar.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnsureCategoriesResult {
    pub created: usize,
    pub existing: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoveCategoriesResult {
    pub removed_colors: usize,
    pub removed_names: usize,
}

pub fn validate_category_name(name: &str) -> Result<(), String> {
    validate_non_empty(name, "category name")?;
    if name.contains(',') {
        return Err(format!("category name must not contain ',': {name}"));
    }
    Ok(())
}

fn validate_color(value: &str, category: &str) -> Result<(), String> {
    let Some(hex) = value.strip_prefix('#') else {
        return Err(format!("color for {category} must be #RRGGBB"));
    };
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(format!("color for {category} must be #RRGGBB"));
    }
    Ok(())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
