//! Population-based evolution of queries.

use log::{debug, info};
use rand::Rng;
use rand::rngs::StdRng;

use crate::compute::domain::InitMethod;
use crate::compute::query::MAX_CHILDREN;
use crate::compute::{Query, SmartScore};
use crate::schema::{PredictionMethod, QueryTemplate, SearchConfig};

use super::SearchError;
use super::iterator::{IterationState, QueryIterator};

/// Seeds that each receive a batch of mutated copies during padding.
const MUTATED_SEEDS: usize = 3;
/// Mutated copies per seed.
const COPIES_PER_SEED: usize = 5;
/// Grafting rounds during padding.
const GRAFTS: usize = 5;

/// A fixed-size population of candidate queries.
///
/// Candidates are handed out in list order. Once each one has been scored,
/// [`Ecosystem::evolve`] keeps the best as seeds and refills the population.
pub struct Ecosystem {
    state: IterationState,
    template: QueryTemplate,
    prediction_method: PredictionMethod,
    t_min: i64,
    t_max: i64,
    size: usize,
    survivors: usize,
    population: Vec<Query>,
    results: Vec<(SmartScore, Query)>,
    index: usize,
    generation: usize,
    rng: StdRng,
}

impl Ecosystem {
    /// Seed from `seeds` and pad to the configured population size.
    ///
    /// At most one seed may match every event.
    pub fn new(seeds: Vec<Query>, config: &SearchConfig, rng: StdRng) -> Result<Self, SearchError> {
        let match_all = seeds.iter().filter(|q| q.all).count();
        if match_all > 1 {
            return Err(SearchError::MultipleMatchAll(match_all));
        }
        let ceiling = seeds.len();
        let mut ecosystem = Self {
            state: IterationState::default(),
            template: config.template.clone(),
            prediction_method: config.prediction_method.clone(),
            t_min: config.window.t_min,
            t_max: config.window.t_max,
            size: config.population.size,
            survivors: config.population.survivors,
            population: seeds,
            results: Vec::new(),
            index: 0,
            generation: 0,
            rng,
        };
        ecosystem.pad(ceiling);
        Ok(ecosystem)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.state.label = label.into();
        self
    }

    pub fn population(&self) -> &[Query] {
        &self.population
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Scores recorded this generation.
    pub fn results(&self) -> &[(SmartScore, Query)] {
        &self.results
    }

    fn random_query(&mut self) -> Query {
        Query::new(
            InitMethod::Random,
            self.t_min,
            self.t_max,
            self.prediction_method.clone(),
            &self.template,
            &mut self.rng,
        )
    }

    /// Refill the population to its target size.
    ///
    /// Random picks are drawn from the first `ceiling` members. Match-all
    /// queries are kept aside and returned to the front unchanged, and count
    /// toward the target size.
    fn pad(&mut self, ceiling: usize) {
        let (front, mut pool): (Vec<Query>, Vec<Query>) =
            std::mem::take(&mut self.population)
                .into_iter()
                .partition(|q| q.all);
        let target = self.size.saturating_sub(front.len());
        let seeded = pool.len();
        pool.truncate(target);

        if pool.is_empty() && target > 0 {
            let fresh = self.random_query();
            pool.push(fresh);
        }

        for i in 0..MUTATED_SEEDS.min(pool.len()) {
            for _ in 0..COPIES_PER_SEED {
                if pool.len() >= target {
                    break;
                }
                let copy = pool[i].mutated_copy(&self.template, &mut self.rng);
                pool.push(copy);
            }
        }

        for _ in 0..GRAFTS {
            if pool.len() >= target {
                break;
            }
            let limit = pool.len().min(ceiling).max(1);
            let mut grafted = pool[self.rng.gen_range(0..limit)].clone();
            grafted.renew_order();
            if grafted.children.len() < MAX_CHILDREN {
                let mut child = pool[self.rng.gen_range(0..limit)].clone();
                child.renew_order();
                grafted.children.push(child);
            }
            pool.push(grafted);
        }

        while pool.len() < target {
            let limit = pool.len().min(ceiling).max(1);
            // Cubic draw favours the front of the list.
            let r = self.rng.r#gen::<f64>();
            let pick = ((r.powi(3) * limit as f64) as usize).min(limit - 1);
            let copy = pool[pick].mutated_copy(&self.template, &mut self.rng);
            pool.push(copy);
        }

        debug!(
            "padded population from {} seeds to {} (+{} match-all)",
            seeded,
            pool.len(),
            front.len()
        );
        self.population = front;
        self.population.append(&mut pool);
    }

    /// Close the generation: keep the best scored candidates and refill.
    pub fn evolve(&mut self) {
        let mut results = std::mem::take(&mut self.results);
        results.sort_by(|(sa, qa), (sb, qb)| {
            sb.fitness_key()
                .total_cmp(&sa.fitness_key())
                .then_with(|| qa.order().cmp(&qb.order()))
        });
        let keep = self.survivors.min(results.len());
        if let Some((best, _)) = results.first() {
            info!(
                "generation {} complete, best {} of {} scored",
                self.generation,
                best,
                results.len()
            );
        }
        self.population = results.into_iter().take(keep).map(|(_, q)| q).collect();
        self.pad(self.survivors);
        self.index = 0;
        self.generation += 1;
    }
}

impl QueryIterator for Ecosystem {
    fn state(&self) -> &IterationState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut IterationState {
        &mut self.state
    }

    fn next_query(&mut self) -> Option<Query> {
        let query = self.population.get(self.index)?.clone();
        self.index += 1;
        Some(query)
    }

    fn total_iterations(&self) -> Option<u64> {
        Some(self.population.len() as u64)
    }

    fn record_score(&mut self, score: &SmartScore, query: Query) {
        self.results.push((*score, query));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PopulationConfig;
    use rand::SeedableRng;

    fn config(size: usize, survivors: usize) -> SearchConfig {
        SearchConfig {
            population: PopulationConfig {
                size,
                survivors,
                generations: 3,
            },
            ..Default::default()
        }
    }

    fn seeds(config: &SearchConfig) -> Vec<Query> {
        let t = &config.template;
        vec![
            Query::match_all(config.window.t_min, config.window.t_max, t),
            Query::full(config.window.t_min, config.window.t_max, t),
        ]
    }

    #[test]
    fn test_new_pads_to_size_with_match_all_first() {
        let config = config(20, 5);
        let eco = Ecosystem::new(seeds(&config), &config, StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(eco.population().len(), 20);
        assert!(eco.population()[0].all);
        assert_eq!(eco.population().iter().filter(|q| q.all).count(), 1);
    }

    #[test]
    fn test_multiple_match_all_seeds_rejected() {
        let config = config(10, 3);
        let t = &config.template;
        let seeds = vec![Query::match_all(-2, 2, t), Query::match_all(-2, 2, t)];
        assert!(matches!(
            Ecosystem::new(seeds, &config, StdRng::seed_from_u64(1)),
            Err(SearchError::MultipleMatchAll(2))
        ));
    }

    #[test]
    fn test_iterates_population_in_order_then_stops() {
        let config = config(8, 3);
        let mut eco = Ecosystem::new(seeds(&config), &config, StdRng::seed_from_u64(2)).unwrap();
        let orders: Vec<u64> = eco.population().iter().map(Query::order).collect();
        let mut handed = Vec::new();
        while let Some(q) = eco.next() {
            handed.push(q.order());
        }
        assert_eq!(handed, orders);
    }

    #[test]
    fn test_evolve_keeps_best_and_refills() {
        let config = config(12, 4);
        let mut eco = Ecosystem::new(seeds(&config), &config, StdRng::seed_from_u64(3)).unwrap();
        let mut scored = Vec::new();
        let mut i = 0.0;
        while let Some(q) = eco.next() {
            i += 1.0;
            let score = SmartScore::Error(i);
            scored.push((score, q.order()));
            eco.record_score(&score, q);
        }
        eco.evolve();

        assert_eq!(eco.population().len(), 12);
        assert!(eco.results().is_empty());
        assert_eq!(eco.generation(), 1);
        // Lowest error survives.
        let best_order = scored[0].1;
        assert!(eco.population().iter().any(|q| q.order() == best_order));
    }

    #[test]
    fn test_evolve_with_fewer_results_than_survivors() {
        let config = config(10, 6);
        let mut eco = Ecosystem::new(seeds(&config), &config, StdRng::seed_from_u64(4)).unwrap();
        let first = eco.next().unwrap();
        let second = eco.next().unwrap();
        let (o1, o2) = (first.order(), second.order());
        eco.record_score(&SmartScore::Error(1.0), first);
        eco.record_score(&SmartScore::Error(2.0), second);
        eco.evolve();

        assert_eq!(eco.population().len(), 10);
        assert!(eco.population().iter().any(|q| q.order() == o1));
        assert!(eco.population().iter().any(|q| q.order() == o2));
    }

    #[test]
    fn test_population_never_exceeds_size() {
        for size in 1..=4 {
            let config = config(size, 1);
            let mut eco =
                Ecosystem::new(seeds(&config), &config, StdRng::seed_from_u64(6)).unwrap();
            assert_eq!(eco.population().len(), size);
            assert!(eco.population()[0].all);

            while let Some(q) = eco.next() {
                eco.record_score(&SmartScore::Error(1.0), q);
            }
            eco.evolve();
            assert_eq!(eco.population().len(), size);
        }
    }

    #[test]
    fn test_evolve_with_no_results_still_refills() {
        let config = config(6, 2);
        let mut eco = Ecosystem::new(Vec::new(), &config, StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(eco.population().len(), 6);
        eco.evolve();
        assert_eq!(eco.population().len(), 6);
    }
}
