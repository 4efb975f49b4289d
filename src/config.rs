// Run configuration: what to search for and where, and how politely. Loaded from a JSON file,
// every field optional, defaults cover Lakeland, FL.

use crate::{models::SourceKind, plan::AnchorPoint, scrape::ExecPolicy};
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} is required for source {1}")]
    MissingCredential(&'static str, SourceKind),
    #[error("{0}")]
    Invalid(String),
}

/// South-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            south: 27.95,
            west: -82.05,
            north: 28.13,
            east: -81.85,
        }
    }
}

/// Overpass order: `s,w,n,e`
impl Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.south, self.west, self.north, self.east)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub city: String,
    pub state: String,
    /// Used in call sheet openers
    pub directory_name: String,
    pub anchors: Vec<AnchorPoint>,
    /// Free-text search terms for the Places API
    pub terms: Vec<String>,
    /// Category slugs for the directory sites
    pub directory_terms: Vec<String>,
    pub bbox: BoundingBox,
    pub policy: ExecPolicy,
    /// Wait between detail lookups
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub detail_delay: Duration,
    /// Rows per request against the contacts table
    pub contacts_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            city: "Lakeland".into(),
            state: "FL".into(),
            directory_name: "Lakeland Local".into(),
            anchors: default_anchors(),
            terms: to_strings(DEFAULT_TERMS),
            directory_terms: to_strings(DEFAULT_DIRECTORY_TERMS),
            bbox: BoundingBox::default(),
            policy: ExecPolicy::default(),
            detail_delay: Duration::from_millis(100),
            contacts_page_size: 1000,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.into(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Built-in defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.city.trim().is_empty() {
            return Err(ConfigError::Invalid("city must not be empty".into()));
        }
        if self.anchors.is_empty() {
            return Err(ConfigError::Invalid("at least one anchor is required".into()));
        }
        if self.policy.max_pages == 0 {
            return Err(ConfigError::Invalid("policy.max_pages must be at least 1".into()));
        }
        if self.bbox.south >= self.bbox.north || self.bbox.west >= self.bbox.east {
            return Err(ConfigError::Invalid(format!("degenerate bbox {}", self.bbox)));
        }
        Ok(())
    }

    /// Address used when a source has none: "Lakeland, FL"
    pub fn fallback_address(&self) -> String {
        format!("{}, {}", self.city, self.state)
    }
}

/// Secrets and connection strings, from the environment or the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub places_key: Option<String>,
    pub contacts_url: Option<String>,
    pub contacts_key: Option<String>,
}

impl Credentials {
    /// Fail if any of the given sources lacks what it needs to run
    pub fn check(&self, sources: &[SourceKind]) -> Result<(), ConfigError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        for &s in sources {
            match s {
                SourceKind::Places if !present(&self.places_key) => {
                    return Err(ConfigError::MissingCredential("GOOGLE_PLACES_API_KEY", s));
                }
                SourceKind::Contacts if !present(&self.contacts_url) => {
                    return Err(ConfigError::MissingCredential("CONTACTS_API_URL", s));
                }
                SourceKind::Contacts if !present(&self.contacts_key) => {
                    return Err(ConfigError::MissingCredential("CONTACTS_API_KEY", s));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn to_strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn default_anchors() -> Vec<AnchorPoint> {
    const RADIUS: u32 = 8000;
    vec![
        AnchorPoint::new("Downtown Lakeland", 28.0395, -81.9498, RADIUS),
        AnchorPoint::new("North Lakeland", 28.0800, -81.9500, RADIUS),
        AnchorPoint::new("South Lakeland", 28.0000, -81.9500, RADIUS),
        AnchorPoint::new("East Lakeland", 28.0395, -81.9000, RADIUS),
        AnchorPoint::new("West Lakeland", 28.0395, -82.0000, RADIUS),
        AnchorPoint::new("Mulberry/Highland", 27.9600, -81.9700, RADIUS),
    ]
}

const DEFAULT_TERMS: &[&str] = &[
    // home services
    "hvac contractor",
    "plumber",
    "roofing contractor",
    "electrician",
    "pest control",
    "landscaping",
    "painters",
    "carpet cleaning",
    "handyman",
    "garage door",
    "fence contractor",
    "tree service",
    "pressure washing",
    "pool service",
    "locksmith",
    "moving company",
    "cleaning service",
    "flooring contractor",
    "home inspector",
    // auto
    "auto repair",
    "car dealership",
    "auto body shop",
    "tire shop",
    "towing service",
    "car wash",
    "oil change",
    // food
    "restaurant",
    "bar",
    "cafe",
    "bakery",
    "pizza",
    "food truck",
    // health
    "dentist",
    "chiropractor",
    "gym",
    "yoga studio",
    "spa",
    "barber shop",
    "hair salon",
    "nail salon",
    "massage therapy",
    "veterinarian",
    // professional
    "lawyer",
    "accountant",
    "real estate agent",
    "insurance agent",
    "financial advisor",
    "tax preparation",
    // retail
    "vape shop",
    "liquor store",
    "pet store",
    "hardware store",
    "thrift store",
    "jewelry store",
    "smoke shop",
    "cell phone repair",
    // other
    "daycare",
    "tutoring",
    "storage facility",
    "printing service",
    "wedding venue",
    "photographer",
    "funeral home",
];

const DEFAULT_DIRECTORY_TERMS: &[&str] = &[
    "hvac",
    "plumbers",
    "roofing",
    "electricians",
    "pest_control",
    "landscaping",
    "painters",
    "carpet_cleaning",
    "handyman",
    "garage_door_services",
    "fences_gates",
    "tree_services",
    "pressure_washers",
    "pool_cleaners",
    "locksmiths",
    "movers",
    "house_cleaning",
    "flooring",
    "home_inspectors",
    "auto_repair",
    "car_dealers",
    "body_shops",
    "tires",
    "towing",
    "car_wash",
    "restaurants",
    "bars",
    "coffee",
    "bakeries",
    "pizza",
    "dentists",
    "chiropractors",
    "gyms",
    "yoga",
    "day_spas",
    "barbers",
    "hair_salons",
    "nail_salons",
    "massage_therapy",
    "veterinarians",
    "lawyers",
    "accountants",
    "real_estate_agents",
    "insurance",
    "vape_shops",
    "pet_stores",
    "hardware_stores",
    "thrift_stores",
    "jewelry",
    "mobile_phone_repair",
    "child_care",
    "self_storage",
    "photographers",
    "wedding_planning",
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().unwrap();
        assert_eq!(6, cfg.anchors.len());
        assert_eq!("Lakeland, FL", cfg.fallback_address());
        assert_eq!("27.95,-82.05,28.13,-81.85", cfg.bbox.to_string());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{ "city": "Winter Haven", "terms": ["plumber"], "policy": {{ "max_pages": 3 }}, "detail_delay": 250 }}"#
        )
        .unwrap();

        let cfg = Config::load(f.path()).unwrap();
        assert_eq!("Winter Haven", cfg.city);
        assert_eq!("FL", cfg.state);
        assert_eq!(vec!["plumber".to_string()], cfg.terms);
        assert_eq!(3, cfg.policy.max_pages);
        assert_eq!(Duration::from_secs(30), cfg.policy.cooldown);
        assert_eq!(Duration::from_millis(250), cfg.detail_delay);
        assert_eq!(6, cfg.anchors.len());
    }

    #[test]
    fn rejects_zero_pages() {
        let mut cfg = Config::default();
        cfg.policy.max_pages = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_and_bad_json() {
        assert!(matches!(
            Config::load("/nonexistent/localfinds.json"),
            Err(ConfigError::Read { .. })
        ));
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{{ not json").unwrap();
        assert!(matches!(Config::load(f.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn credentials_checked_per_source() {
        let creds = Credentials::default();
        assert!(creds.check(&[SourceKind::Osm, SourceKind::Yelp]).is_ok());
        assert!(matches!(
            creds.check(&[SourceKind::Osm, SourceKind::Places]),
            Err(ConfigError::MissingCredential("GOOGLE_PLACES_API_KEY", SourceKind::Places))
        ));

        let creds = Credentials {
            contacts_url: Some("https://db.example".into()),
            contacts_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(matches!(
            creds.check(&[SourceKind::Contacts]),
            Err(ConfigError::MissingCredential("CONTACTS_API_KEY", _))
        ));
    }
}
