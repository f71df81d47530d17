use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct City {
    pub name: &'static str,
    pub lat: f64,
    pub lon: f64,
    /// Standard-time UTC offset. Every supported city also observes US DST.
    pub standard_offset_hours: i64,
}

impl City {
    /// UTC offset in effect at `now`, daylight saving included.
    pub fn utc_offset_hours(&self, now: DateTime<Utc>) -> i64 {
        if us_daylight_saving(now.naive_utc(), self.standard_offset_hours) {
            self.standard_offset_hours + 1
        } else {
            self.standard_offset_hours
        }
    }

    /// Calendar date on the city's wall clock. Providers that report in
    /// local time index their days by this date.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + Duration::hours(self.utc_offset_hours(now))).date_naive()
    }
}

/// US rule: second Sunday of March to first Sunday of November, switching at
/// 02:00 local wall time.
fn us_daylight_saving(utc: NaiveDateTime, standard_offset_hours: i64) -> bool {
    let year = utc.year();
    let midnight = |month, nth| {
        NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Sun, nth)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    };
    let (Some(march), Some(november)) = (midnight(3, 2), midnight(11, 1)) else {
        return false;
    };

    // 02:00 standard in March, 02:00 daylight (01:00 standard) in November
    let starts = march + Duration::hours(2 - standard_offset_hours);
    let ends = november + Duration::hours(1 - standard_offset_hours);
    starts <= utc && utc < ends
}

pub const NEW_YORK: City = City {
    name: "New York",
    lat: 40.7128,
    lon: -74.0060,
    standard_offset_hours: -5,
};
pub const LOS_ANGELES: City = City {
    name: "Los Angeles",
    lat: 34.0522,
    lon: -118.2437,
    standard_offset_hours: -8,
};
pub const MIAMI: City = City {
    name: "Miami",
    lat: 25.7617,
    lon: -80.1918,
    standard_offset_hours: -5,
};
pub const DENVER: City = City {
    name: "Denver",
    lat: 39.7392,
    lon: -104.9903,
    standard_offset_hours: -7,
};
pub const CHICAGO: City = City {
    name: "Chicago",
    lat: 41.8781,
    lon: -87.6298,
    standard_offset_hours: -6,
};
pub const AUSTIN: City = City {
    name: "Austin",
    lat: 30.2672,
    lon: -97.7431,
    standard_offset_hours: -6,
};

/// Alias table, checked in order. Aliases of three characters or fewer only
/// match whole words so "la" does not fire inside "Atlanta".
const ALIASES: &[(&str, City)] = &[
    ("nyc", NEW_YORK),
    ("new york", NEW_YORK),
    ("la", LOS_ANGELES),
    ("los angeles", LOS_ANGELES),
    ("miami", MIAMI),
    ("denver", DENVER),
    ("chicago", CHICAGO),
    ("austin", AUSTIN),
];

const SHORT_ALIAS_LEN: usize = 3;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("no supported city found in: {snippet:?}")]
pub struct UnsupportedCity {
    pub snippet: String,
}

impl UnsupportedCity {
    fn from_text(text: &str) -> Self {
        let snippet: String = text.trim().chars().take(80).collect();
        Self { snippet }
    }
}

fn alias_matches(haystack: &str, alias: &str) -> bool {
    if alias.len() <= SHORT_ALIAS_LEN {
        haystack
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| word == alias)
    } else {
        haystack.contains(alias)
    }
}

/// Find the city a market question or screenshot is about.
pub fn resolve_city(text: &str) -> Result<City, UnsupportedCity> {
    let haystack = text.to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| alias_matches(&haystack, alias))
        .map(|(_, city)| *city)
        .ok_or_else(|| UnsupportedCity::from_text(text))
}

/// Look up a city by its canonical name or any alias, ignoring case.
pub fn city_by_name(name: &str) -> Result<City, UnsupportedCity> {
    let needle = name.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, city)| *alias == needle || city.name.to_lowercase() == needle)
        .map(|(_, city)| *city)
        .ok_or_else(|| UnsupportedCity::from_text(name))
}

pub fn supported_cities() -> Vec<City> {
    let mut cities: Vec<City> = Vec::new();
    for (_, city) in ALIASES {
        if !cities.iter().any(|c| c.name == city.name) {
            cities.push(*city);
        }
    }
    cities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_aliases() {
        assert_eq!(resolve_city("Highest temperature in NYC today?").unwrap().name, "New York");
        assert_eq!(resolve_city("new york high temp").unwrap().name, "New York");
        assert_eq!(resolve_city("Will LA hit 80°?").unwrap().name, "Los Angeles");
        assert_eq!(resolve_city("Los Angeles daily high").unwrap().name, "Los Angeles");
        assert_eq!(resolve_city("MIAMI 88-89°").unwrap().name, "Miami");
        assert_eq!(resolve_city("Austin, TX").unwrap().name, "Austin");
    }

    #[test]
    fn test_short_alias_needs_word_boundary() {
        assert!(resolve_city("Highest temperature in Atlanta").is_err());
        assert!(resolve_city("Kalshi weather: Dallas").is_err());
    }

    #[test]
    fn test_unsupported_is_reported() {
        let err = resolve_city("Highest temperature in Seattle").unwrap_err();
        assert_eq!(err.snippet, "Highest temperature in Seattle");
    }

    #[test]
    fn test_city_by_name() {
        assert_eq!(city_by_name("chicago").unwrap(), CHICAGO);
        assert_eq!(city_by_name("NYC").unwrap(), NEW_YORK);
        assert_eq!(city_by_name("Los Angeles").unwrap(), LOS_ANGELES);
        assert!(city_by_name("London").is_err());
    }

    #[test]
    fn test_local_date_shifts_west() {
        use chrono::TimeZone;
        let late_utc = Utc.with_ymd_and_hms(2026, 7, 3, 2, 0, 0).unwrap();
        assert_eq!(NEW_YORK.local_date(late_utc), NaiveDate::from_ymd_opt(2026, 7, 2).unwrap());
        let midday = Utc.with_ymd_and_hms(2026, 7, 3, 16, 0, 0).unwrap();
        assert_eq!(LOS_ANGELES.local_date(midday), NaiveDate::from_ymd_opt(2026, 7, 3).unwrap());
    }

    #[test]
    fn test_local_date_just_after_local_midnight() {
        use chrono::TimeZone;
        let july_3 = NaiveDate::from_ymd_opt(2026, 7, 3).unwrap();
        // 00:30 EDT
        let ny = Utc.with_ymd_and_hms(2026, 7, 3, 4, 30, 0).unwrap();
        assert_eq!(NEW_YORK.local_date(ny), july_3);
        // 01:30 CDT
        let austin = Utc.with_ymd_and_hms(2026, 7, 3, 6, 30, 0).unwrap();
        assert_eq!(AUSTIN.local_date(austin), july_3);
        // 00:30 MST in winter
        let denver = Utc.with_ymd_and_hms(2026, 1, 15, 7, 30, 0).unwrap();
        assert_eq!(DENVER.local_date(denver), NaiveDate::from_ymd_opt(2026, 1, 15).unwrap());
    }

    #[test]
    fn test_dst_transitions() {
        use chrono::TimeZone;
        // 2026: DST runs from Sunday March 8 to Sunday November 1
        let at = |m, d, h, min| Utc.with_ymd_and_hms(2026, m, d, h, min, 0).unwrap();
        assert_eq!(NEW_YORK.utc_offset_hours(at(1, 15, 12, 0)), -5);
        assert_eq!(NEW_YORK.utc_offset_hours(at(3, 8, 6, 59)), -5);
        assert_eq!(NEW_YORK.utc_offset_hours(at(3, 8, 7, 0)), -4);
        assert_eq!(NEW_YORK.utc_offset_hours(at(11, 1, 5, 59)), -4);
        assert_eq!(NEW_YORK.utc_offset_hours(at(11, 1, 6, 0)), -5);
        assert_eq!(LOS_ANGELES.utc_offset_hours(at(7, 1, 12, 0)), -7);
        assert_eq!(CHICAGO.utc_offset_hours(at(12, 24, 12, 0)), -6);
    }

    #[test]
    fn test_supported_cities_deduplicated() {
        let cities = supported_cities();
        assert_eq!(cities.len(), 6);
        assert_eq!(cities[0], NEW_YORK);
    }
}
