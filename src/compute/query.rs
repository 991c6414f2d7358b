//! Recursive event-filtering query.
//!
//! A [`Query`] is a tree. Each node owns one domain primitive per matchable
//! event attribute, a temporal shift, a visibility offset and a list of child
//! queries. Evaluating a node counts its matching events into a
//! [`TimeSeries`]; the node's result is its own counts plus every child's
//! result, trimmed to the node's day window.
//!
//! An event counts toward bucket `t + shift` only if it was visible (added to
//! the corpus) no later than `t + shift + viz_offset`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDateTime, TimeDelta};
use log::{debug, trace};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use super::domain::{
    InitMethod, IntegerRange, NumericRange, OrderedSubrange, QueryDomain, UnorderedSubset,
    WrappedRange,
};
use super::series::{ResolutionUnit, TimeSeries};
use crate::schema::{CriteriaSummary, Event, PredictionMethod, QueryField, QueryTemplate};

/// Hours a time-shift mutation moves the shift by.
pub const SHIFT_STEP_HOURS: i64 = 24;

/// Upper bound on children a query may carry before grafting stops.
pub const MAX_CHILDREN: usize = 20;

static NEXT_ORDER: AtomicU64 = AtomicU64::new(0);

fn next_order() -> u64 {
    NEXT_ORDER.fetch_add(1, Ordering::Relaxed)
}

fn default_multiplier() -> f64 {
    1.0
}

/// Per-bucket, per-event weights recorded during evaluation.
pub type EventWeights = BTreeMap<NaiveDateTime, BTreeMap<u64, f64>>;

/// Anchor and switches for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvalSettings<'a> {
    pub template: &'a QueryTemplate,
    pub t_zero: NaiveDateTime,
    pub resolution: i64,
    pub unit: ResolutionUnit,
    pub use_date_added: bool,
}

/// Textual query representation could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum QueryFormatError {
    #[error("Malformed query: {0}")]
    Json(#[from] serde_json::Error),
}

/// A node of the query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default = "next_order")]
    order: u64,
    /// Match every event, ignoring all domains.
    #[serde(default)]
    pub all: bool,
    /// Weight added per matching event.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub prediction_method: PredictionMethod,
    /// Temporal shift in hours.
    pub shift: i64,
    pub min_shift: i64,
    pub max_shift: i64,
    /// Visibility offset in hours.
    pub viz_offset: i64,
    pub min_viz_offset: i64,
    pub max_viz_offset: i64,
    /// Day window the result is trimmed to.
    pub t_min: i64,
    pub t_max: i64,
    pub goldstein_scale: NumericRange,
    pub root_code: OrderedSubrange<i64>,
    pub avg_tone: NumericRange,
    pub quad_class: IntegerRange,
    pub actor1_country_code: UnorderedSubset<String>,
    pub actor2_country_code: UnorderedSubset<String>,
    pub action_lat: NumericRange,
    pub action_lon: WrappedRange,
    #[serde(default)]
    pub children: Vec<Query>,
    #[serde(skip)]
    returned_values: bool,
    #[serde(skip)]
    direct: Option<TimeSeries>,
}

impl Query {
    /// A query initialised with `init`, windowed to `[t_min, t_max)` days.
    pub fn new<R: Rng + ?Sized>(
        init: InitMethod,
        t_min: i64,
        t_max: i64,
        prediction_method: PredictionMethod,
        template: &QueryTemplate,
        rng: &mut R,
    ) -> Self {
        let mut query = Self::with_method(t_min, t_max, prediction_method, template);
        if init == InitMethod::Random {
            query.goldstein_scale.init_random(rng);
            query.root_code.init_random(rng);
            query.avg_tone.init_random(rng);
            query.quad_class.init_random(rng);
            query.actor1_country_code.init_random(rng);
            query.actor2_country_code.init_random(rng);
            query.action_lat.init_random(rng);
            query.action_lon.init_random(rng);
        }
        query
    }

    /// A full-range query with the given prediction method. Draws no randomness.
    pub fn with_method(
        t_min: i64,
        t_max: i64,
        prediction_method: PredictionMethod,
        template: &QueryTemplate,
    ) -> Self {
        let mut query = Self {
            order: next_order(),
            all: false,
            multiplier: 1.0,
            prediction_method,
            shift: template.shift_bounds.0,
            min_shift: template.shift_bounds.0,
            max_shift: template.shift_bounds.1,
            viz_offset: template.viz_offset_bounds.0,
            min_viz_offset: template.viz_offset_bounds.0,
            max_viz_offset: template.viz_offset_bounds.1,
            t_min,
            t_max,
            goldstein_scale: NumericRange::new(-10.0, 10.0),
            root_code: OrderedSubrange::new((1..=20).collect()),
            avg_tone: NumericRange::new(-100.0, 100.0),
            quad_class: IntegerRange::new(1, 4),
            actor1_country_code: UnorderedSubset::new(template.actor1_country_codes.clone()),
            actor2_country_code: UnorderedSubset::new(template.actor2_country_codes.clone()),
            action_lat: NumericRange::new(-90.0, 90.0),
            action_lon: WrappedRange::new(-180, 180),
            children: Vec::new(),
            returned_values: false,
            direct: None,
        };
        query.goldstein_scale.init_full();
        query.root_code.init_full();
        query.avg_tone.init_full();
        query.quad_class.init_full();
        query.actor1_country_code.init_full();
        query.actor2_country_code.init_full();
        query.action_lat.init_full();
        query.action_lon.init_full();
        query
    }

    /// A full-range query.
    pub fn full(t_min: i64, t_max: i64, template: &QueryTemplate) -> Self {
        Self::with_method(t_min, t_max, PredictionMethod::Raw, template)
    }

    /// A query that matches every event.
    pub fn match_all(t_min: i64, t_max: i64, template: &QueryTemplate) -> Self {
        let mut query = Self::full(t_min, t_max, template);
        query.all = true;
        query
    }

    /// Creation order, used to break score ties deterministically.
    pub fn order(&self) -> u64 {
        self.order
    }

    /// Give this query a fresh creation order.
    pub fn renew_order(&mut self) {
        self.order = next_order();
    }

    /// Whether this node or any descendant counted an event on the last evaluation.
    pub fn returned_values(&self) -> bool {
        self.returned_values
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Query::node_count).sum::<usize>()
    }

    /// Direct-match test for this node only. Children are not consulted.
    fn accepts(&self, event: &Event, template: &QueryTemplate) -> bool {
        self.all
            || ((!template.match_goldstein_scale
                || self.goldstein_scale.matches(&event.goldstein_scale))
                && (!template.match_root_code || self.root_code.matches(&event.root_code))
                && (!template.match_average_tone || self.avg_tone.matches(&event.avg_tone))
                && (!template.match_quad_class || self.quad_class.matches(&event.quad_class))
                && (!template.match_actor1()
                    || self.actor1_country_code.matches(&event.actor1_country_code))
                && (!template.match_actor2()
                    || self.actor2_country_code.matches(&event.actor2_country_code))
                && (!template.match_lat_lon
                    || (self.action_lat.matches(&event.action_lat)
                        && self.action_lon.matches(&event.lon_degree()))))
    }

    /// Forget which nodes counted events, ahead of a batch of evaluations.
    pub fn reset_returned(&mut self) {
        self.returned_values = false;
        for child in &mut self.children {
            child.reset_returned();
        }
    }

    /// Count matching events into this node and every descendant.
    ///
    /// Every child is processed even when an earlier one matched nothing.
    /// The returned-values flags accumulate until [`Query::reset_returned`].
    /// Returns whether this node or any descendant has counted an event.
    pub fn process(
        &mut self,
        events: &[Event],
        settings: &EvalSettings<'_>,
        mut weights: Option<&mut EventWeights>,
    ) -> bool {
        for child in &mut self.children {
            let contributed = child.process(events, settings, weights.as_deref_mut());
            self.returned_values |= contributed;
        }

        let mut series = TimeSeries::new(settings.t_zero, settings.resolution, settings.unit);
        let shift = TimeDelta::hours(self.shift);
        let viz = TimeDelta::hours(self.viz_offset);
        for event in events {
            let position = event.nominal_time(settings.use_date_added) + shift;
            let closes = position + viz;
            if event.added_time > closes {
                trace!(
                    "event {} at {} not visible before {}",
                    event.id, position, closes
                );
                continue;
            }
            if self.accepts(event, settings.template) {
                self.returned_values = true;
                series.add_counts_at(position, self.multiplier);
                if let Some(w) = weights.as_deref_mut() {
                    *w.entry(position).or_default().entry(event.id).or_insert(0.0) +=
                        self.multiplier;
                }
            }
        }
        self.direct = Some(series);
        self.returned_values
    }

    /// This node's counts plus every child's result, trimmed to `[t_min, t_max)` days.
    ///
    /// `None` until the query has been processed.
    pub fn result(&self) -> Option<TimeSeries> {
        let mut out = self.direct.clone()?;
        for child in &self.children {
            if let Some(child_result) = child.result() {
                out.add(&child_result);
            }
        }
        out.trim_in(self.t_min, self.t_max, ResolutionUnit::Days);
        Some(out)
    }

    /// Process `events` and return the trimmed result.
    pub fn evaluate(&mut self, events: &[Event], settings: &EvalSettings<'_>) -> TimeSeries {
        self.process(events, settings, None);
        self.result().unwrap_or_else(|| {
            TimeSeries::new(settings.t_zero, settings.resolution, settings.unit)
        })
    }

    /// Drop evaluation state from the whole tree.
    pub fn clear_result(&mut self) {
        self.direct = None;
        self.reset_returned();
        for child in &mut self.children {
            child.clear_result();
        }
    }

    /// A deep copy with evaluation state cleared.
    pub fn blank_clone(&self) -> Self {
        let mut copy = self.clone();
        copy.clear_result();
        copy
    }

    /// Remove children that counted nothing on the last evaluation.
    pub fn prune(&mut self) {
        let before = self.children.len();
        self.children.retain(|c| c.returned_values);
        if self.children.len() != before {
            trace!("pruned children {} -> {}", before, self.children.len());
        }
    }

    /// Return a mutated copy, leaving `self` pruned but otherwise untouched.
    ///
    /// With probability `template.new_random_probability` the copy is instead a
    /// fresh random query.
    pub fn mutated_copy<R: Rng + ?Sized>(&mut self, template: &QueryTemplate, rng: &mut R) -> Query {
        self.prune();
        if rng.r#gen::<f64>() < template.new_random_probability {
            debug!("replacing query {} with a fresh random query", self.order);
            return Query::new(
                InitMethod::Random,
                self.t_min,
                self.t_max,
                self.prediction_method.clone(),
                template,
                rng,
            );
        }
        let mut copy = self.clone();
        copy.renew_order();
        copy.mutate_body(template, rng);
        copy
    }

    /// Mutate this query in place. Match-everything queries are left alone.
    pub fn mutate_in_place<R: Rng + ?Sized>(&mut self, template: &QueryTemplate, rng: &mut R) {
        self.prune();
        if self.all {
            return;
        }
        self.mutate_body(template, rng);
    }

    fn mutate_body<R: Rng + ?Sized>(&mut self, template: &QueryTemplate, rng: &mut R) {
        if !self.children.is_empty() && rng.r#gen::<f64>() < template.child_removal_probability {
            let i = rng.gen_range(0..self.children.len());
            self.children.remove(i);
        }
        for child in &mut self.children {
            child.mutate_in_place(template, rng);
        }

        for selector in &template.mutator_selectors {
            let Ok(dist) = WeightedIndex::new(selector.fields.iter().map(|f| f.weight)) else {
                continue;
            };
            let field = selector.fields[dist.sample(rng)].field;
            self.mutate_field(field, template.expand_bias, rng);
        }

        if rng.r#gen::<f64>() < template.time_shift_probability {
            let before = self.shift;
            if self.shift <= self.min_shift {
                self.shift += SHIFT_STEP_HOURS;
            } else if self.shift >= self.max_shift {
                self.shift -= SHIFT_STEP_HOURS;
            } else if rng.gen_bool(0.5) {
                self.shift += SHIFT_STEP_HOURS;
            } else {
                self.shift -= SHIFT_STEP_HOURS;
            }
            self.shift = self.shift.clamp(self.min_shift, self.max_shift.max(self.min_shift));
            trace!("shift {} -> {}", before, self.shift);
        }
    }

    fn mutate_field<R: Rng + ?Sized>(&mut self, field: QueryField, bias: f64, rng: &mut R) {
        match field {
            QueryField::Actor1CountryCodes => {
                self.actor1_country_code.mutate(bias, rng);
            }
            QueryField::Actor2CountryCodes => {
                self.actor2_country_code.mutate(bias, rng);
            }
            QueryField::GoldsteinScale => {
                self.goldstein_scale.mutate(bias, rng);
            }
            QueryField::AverageTone => {
                self.avg_tone.mutate(bias, rng);
            }
            QueryField::RootCode => {
                self.root_code.mutate(bias, rng);
            }
            QueryField::QuadClass => {
                self.quad_class.mutate(bias, rng);
            }
            QueryField::LatLon => {
                // At least one of the pair moves; both move a third of the time.
                let v = rng.r#gen::<f64>();
                if v < 2.0 / 3.0 {
                    self.action_lat.mutate(bias, rng);
                }
                if v > 1.0 / 3.0 {
                    self.action_lon.mutate(bias, rng);
                }
            }
        }
    }

    /// Weighted tally of the literal values matched by every node in the tree.
    pub fn summary_of_criteria(&self, template: &QueryTemplate) -> CriteriaSummary {
        let mut summary = CriteriaSummary::default();
        self.collect_criteria(template, &mut summary);
        summary
    }

    fn collect_criteria(&self, template: &QueryTemplate, summary: &mut CriteriaSummary) {
        let w = self.multiplier;
        if template.match_actor1() {
            for code in self.actor1_country_code.included() {
                summary.tally("Actor1CountryCode", code.clone(), w);
            }
        }
        if template.match_actor2() {
            for code in self.actor2_country_code.included() {
                summary.tally("Actor2CountryCode", code.clone(), w);
            }
        }
        if template.match_goldstein_scale {
            summary.tally("GoldsteinScale", self.goldstein_scale.to_string(), w);
        }
        if template.match_root_code {
            for code in self.root_code.matching_values() {
                summary.tally("RootCode", code.to_string(), w);
            }
        }
        if template.match_average_tone {
            summary.tally("AverageTone", self.avg_tone.to_string(), w);
        }
        if template.match_quad_class {
            for class in self.quad_class.matching_values() {
                summary.tally("QuadClass", class.to_string(), w);
            }
        }
        if template.match_lat_lon {
            summary.tally("ActionLat", self.action_lat.to_string(), w);
            summary.tally("ActionLon", self.action_lon.to_string(), w);
        }
        for child in &self.children {
            child.collect_criteria(template, summary);
        }
    }

    /// Re-parseable representation of the whole tree.
    pub fn to_json(&self) -> Result<String, QueryFormatError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, QueryFormatError> {
        Ok(serde_json::from_str(text)?)
    }
}
