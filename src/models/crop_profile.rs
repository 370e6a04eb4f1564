use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference growing-degree-day data for a crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CropProfile {
    pub gdd_to_maturity: f64,
    pub daily_gdd_rate_assumption: f64,
}

/// Read-only crop table keyed by lowercase crop name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CropProfiles {
    profiles: BTreeMap<String, CropProfile>,
}

impl CropProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, crop: &str, profile: CropProfile) -> Option<CropProfile> {
        self.profiles.insert(normalize_crop(crop), profile)
    }

    pub fn get(&self, crop: &str) -> Option<&CropProfile> {
        self.profiles.get(&normalize_crop(crop))
    }

    pub fn crops(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

pub fn normalize_crop(crop: &str) -> String {
    crop.trim().to_lowercase()
}
