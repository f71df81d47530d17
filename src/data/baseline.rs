use serde::Deserialize;
use std::collections::HashMap;

pub const DEFAULT_HIGH_F: f64 = 78.0;

/// Historical average daily high per city, in °F.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BaselineTable {
    highs: HashMap<String, f64>,
    default_high_f: f64,
}

/// `[baselines]` section: a default plus per-city overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineConfig {
    #[serde(default)]
    pub default_high_f: Option<f64>,
    #[serde(default)]
    pub cities: HashMap<String, f64>,
}

impl BaselineTable {
    pub fn builtin() -> Self {
        let highs = [
            ("New York", 76.0),
            ("Miami", 88.0),
            ("Denver", 79.0),
            ("Chicago", 75.0),
            ("Austin", 89.0),
            ("Los Angeles", 77.0),
        ]
        .into_iter()
        .map(|(city, high)| (normalize(city), high))
        .collect();

        Self {
            highs,
            default_high_f: DEFAULT_HIGH_F,
        }
    }

    /// Built-in table with the configured overrides applied on top.
    pub fn from_config(config: &BaselineConfig) -> Self {
        let mut table = Self::builtin();
        if let Some(default) = config.default_high_f.filter(|d| d.is_finite()) {
            table.default_high_f = default;
        }
        for (city, high) in &config.cities {
            if high.is_finite() {
                table.highs.insert(normalize(city), *high);
            } else {
                tracing::warn!("Ignoring non-finite baseline for {}", city);
            }
        }
        table
    }

    pub fn lookup(&self, city: &str) -> f64 {
        self.highs
            .get(&normalize(city))
            .copied()
            .unwrap_or(self.default_high_f)
    }

    pub fn contains(&self, city: &str) -> bool {
        self.highs.contains_key(&normalize(city))
    }

    pub fn default_high_f(&self) -> f64 {
        self.default_high_f
    }
}

impl Default for BaselineTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(city: &str) -> String {
    city.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let table = BaselineTable::builtin();
        assert_eq!(table.lookup("New York"), 76.0);
        assert_eq!(table.lookup("miami"), 88.0);
        assert_eq!(table.lookup(" Austin "), 89.0);
    }

    #[test]
    fn test_unknown_city_uses_default() {
        let table = BaselineTable::builtin();
        assert!(!table.contains("Seattle"));
        assert_eq!(table.lookup("Seattle"), DEFAULT_HIGH_F);
    }

    #[test]
    fn test_config_overrides() {
        let config: BaselineConfig = toml::from_str(
            r#"
            default_high_f = 70.0
            [cities]
            "Chicago" = 73.5
            "Seattle" = 68.0
            "#,
        )
        .unwrap();

        let table = BaselineTable::from_config(&config);
        assert_eq!(table.lookup("Chicago"), 73.5);
        assert_eq!(table.lookup("seattle"), 68.0);
        assert_eq!(table.lookup("Denver"), 79.0);
        assert_eq!(table.lookup("Boston"), 70.0);
    }
}
