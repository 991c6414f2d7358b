//! Event records evaluated by queries.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single coded event.
///
/// `event_time` is when the event happened; `added_time` is when it became
/// visible in the corpus. Visibility always uses `added_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub event_time: NaiveDateTime,
    pub added_time: NaiveDateTime,
    #[serde(default)]
    pub goldstein_scale: f64,
    #[serde(default)]
    pub root_code: i64,
    #[serde(default = "default_quad_class")]
    pub quad_class: i64,
    #[serde(default)]
    pub avg_tone: f64,
    #[serde(default)]
    pub actor1_country_code: String,
    #[serde(default)]
    pub actor2_country_code: String,
    #[serde(default)]
    pub action_lat: f64,
    #[serde(default)]
    pub action_lon: f64,
}

fn default_quad_class() -> i64 {
    1
}

impl Event {
    /// An event with neutral attributes, visible at the moment it happens.
    pub fn at(id: u64, event_time: NaiveDateTime) -> Self {
        Self {
            id,
            event_time,
            added_time: event_time,
            goldstein_scale: 0.0,
            root_code: 1,
            quad_class: default_quad_class(),
            avg_tone: 0.0,
            actor1_country_code: String::new(),
            actor2_country_code: String::new(),
            action_lat: 0.0,
            action_lon: 0.0,
        }
    }

    /// Nominal time used for bucketing.
    pub fn nominal_time(&self, use_date_added: bool) -> NaiveDateTime {
        if use_date_added {
            self.added_time
        } else {
            self.event_time
        }
    }

    /// Longitude as the integer degree used by the wrapped domain.
    pub fn lon_degree(&self) -> i64 {
        self.action_lon.floor() as i64
    }
}
