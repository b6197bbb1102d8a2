//! Generational genetic algorithm over flat gene vectors.
//!
//! Each generation keeps the top `transfer_ratio`% individuals unchanged and
//! breeds the rest from parents drawn uniformly (with replacement) out of the
//! top `crossover_ratio`%. A child's gene is either a fresh random gene
//! (`mutate_probability`%), the mother's gene (`parent_ratio`%) or the
//! father's gene. Fitness is evaluated on a [`ThreadPool`], one task per
//! individual, and the population is kept sorted best-first.

use crate::error::{Error, Result};
use crate::pool::ThreadPool;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaParams {
    pub population_size: usize,
    /// Percent chance a gene is taken from the mother rather than the father.
    pub parent_ratio: usize,
    /// Percent chance a gene is replaced by a fresh random gene.
    pub mutate_probability: usize,
    /// Percent of the population carried over unchanged.
    pub transfer_ratio: usize,
    /// Percent of the population, best first, eligible as parents.
    pub crossover_ratio: usize,
    pub genetic_length: usize,
    pub seed: Option<u64>,
    /// Worker threads; hardware concurrency when `None`.
    pub threads: Option<usize>,
}

impl GaParams {
    pub fn new(population_size: usize, genetic_length: usize) -> Self {
        Self {
            population_size,
            parent_ratio: 50,
            mutate_probability: 1,
            transfer_ratio: 15,
            crossover_ratio: 50,
            genetic_length,
            seed: None,
            threads: None,
        }
    }

    pub fn transfer_count(&self) -> usize {
        self.transfer_ratio * self.population_size / 100
    }

    pub fn crossover_threshold(&self) -> usize {
        self.crossover_ratio * self.population_size / 100
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(Error::InvalidConfig(msg));
        if self.population_size == 0 {
            return bad("population size must be positive".into());
        }
        if self.genetic_length == 0 {
            return bad("genetic vector length must be positive".into());
        }
        for (name, v) in [
            ("parent_ratio", self.parent_ratio),
            ("mutate_probability", self.mutate_probability),
            ("transfer_ratio", self.transfer_ratio),
            ("crossover_ratio", self.crossover_ratio),
        ] {
            if v > 100 {
                return bad(format!("{name} is a percentage, got {v}"));
            }
        }
        if self.transfer_count() < self.population_size && self.crossover_threshold() == 0 {
            return bad(format!(
                "crossover_ratio {}% of {} leaves no parents",
                self.crossover_ratio, self.population_size
            ));
        }
        if self.threads == Some(0) {
            return bad("threads must be positive".into());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Individual<T> {
    genes: Vec<T>,
    fitness: f64,
}

impl<T> Individual<T> {
    pub fn new(genes: Vec<T>) -> Self {
        Self { genes, fitness: 0.0 }
    }

    pub fn genes(&self) -> &[T] {
        &self.genes
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn into_genes(self) -> Vec<T> {
        self.genes
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub generation: usize,
    pub best: f64,
    pub mean: f64,
    pub worst: f64,
}

type FitnessFn<T> = dyn Fn(&[T]) -> Result<f64> + Send + Sync;

pub struct GeneticAlgorithm<T> {
    params: GaParams,
    population: Vec<Individual<T>>,
    generation: usize,
    fitness: Arc<FitnessFn<T>>,
    random_gene: Box<dyn FnMut() -> T + Send>,
    rng: SmallRng,
    pool: ThreadPool,
}

impl<T: Clone + Send + Sync + 'static> GeneticAlgorithm<T> {
    /// `fitness` scores a gene vector, higher is better. It runs concurrently
    /// for different individuals and must not share mutable state between calls.
    /// `random_gene` is only called from the thread driving the algorithm.
    pub fn new<F, G>(params: GaParams, fitness: F, random_gene: G) -> Result<Self>
    where
        F: Fn(&[T]) -> Result<f64> + Send + Sync + 'static,
        G: FnMut() -> T + Send + 'static,
    {
        params.validate()?;
        let pool = match params.threads {
            Some(n) => ThreadPool::new(n)?,
            None => ThreadPool::with_available_parallelism()?,
        };
        let rng = match params.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Ok(Self {
            params,
            population: Vec::new(),
            generation: 0,
            fitness: Arc::new(fitness),
            random_gene: Box::new(random_gene),
            rng,
            pool,
        })
    }

    pub fn params(&self) -> &GaParams {
        &self.params
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Current population, best first.
    pub fn population(&self) -> &[Individual<T>] {
        &self.population
    }

    pub fn best_individual(&self) -> Option<&Individual<T>> {
        self.population.first()
    }

    pub fn create_initial_population(&mut self) -> Result<()> {
        let len = self.params.genetic_length;
        let mut population: Vec<Individual<T>> = (0..self.params.population_size)
            .map(|_| Individual::new((0..len).map(|_| (self.random_gene)()).collect()))
            .collect();

        self.evaluate(&mut population)?;
        sort_best_first(&mut population);
        self.population = population;
        self.generation = 1;
        debug!(generation = self.generation, best = self.population[0].fitness, "initial population");
        Ok(())
    }

    pub fn create_next_population(&mut self) -> Result<()> {
        if self.population.is_empty() {
            return Err(Error::EmptyPopulation);
        }
        let transfer = self.params.transfer_count();
        let threshold = self.params.crossover_threshold();
        let children = self.params.population_size - transfer;

        let mut offspring = Vec::with_capacity(children);
        for _ in 0..children {
            let mother = self.rng.gen_range(0..threshold);
            let father = self.rng.gen_range(0..threshold);
            offspring.push(self.create_child(mother, father));
        }
        self.evaluate(&mut offspring)?;

        let mut next: Vec<Individual<T>> = self.population[..transfer].to_vec();
        next.extend(offspring);
        sort_best_first(&mut next);
        self.population = next;
        self.generation += 1;
        debug!(generation = self.generation, best = self.population[0].fitness, "next population");
        Ok(())
    }

    pub fn stats(&self) -> Option<GenerationStats> {
        let best = self.population.first()?.fitness;
        let worst = self.population.last()?.fitness;
        let mean =
            self.population.iter().map(|i| i.fitness).sum::<f64>() / self.population.len() as f64;
        Some(GenerationStats {
            generation: self.generation,
            best,
            mean,
            worst,
        })
    }

    fn create_child(&mut self, mother: usize, father: usize) -> Individual<T> {
        let mut genes = Vec::with_capacity(self.params.genetic_length);
        for i in 0..self.params.genetic_length {
            let gene = if self.rng.gen_range(0..100) < self.params.mutate_probability {
                (self.random_gene)()
            } else if self.rng.gen_range(0..100) < self.params.parent_ratio {
                self.population[mother].genes[i].clone()
            } else {
                self.population[father].genes[i].clone()
            };
            genes.push(gene);
        }
        Individual::new(genes)
    }

    fn evaluate(&self, individuals: &mut [Individual<T>]) -> Result<()> {
        let mut handles = Vec::with_capacity(individuals.len());
        for ind in individuals.iter() {
            let fitness = Arc::clone(&self.fitness);
            let genes = ind.genes.clone();
            handles.push(self.pool.enqueue(move || fitness(&genes))?);
        }

        // wait for every task before reporting the first failure
        let results: Vec<Result<f64>> = handles
            .into_iter()
            .map(|h| h.wait().and_then(|r| r))
            .collect();
        for (ind, res) in individuals.iter_mut().zip(results) {
            let f = res?;
            if f.is_nan() {
                return Err(Error::Fitness("fitness function returned NaN".into()));
            }
            ind.fitness = f;
        }
        Ok(())
    }
}

fn sort_best_first<T>(population: &mut [Individual<T>]) {
    population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> impl FnMut() -> f64 + Send + 'static {
        let mut n = 0.0;
        move || {
            n += 1.0;
            n
        }
    }

    fn params(population: usize, len: usize) -> GaParams {
        GaParams {
            seed: Some(7),
            threads: Some(2),
            ..GaParams::new(population, len)
        }
    }

    fn sum(genes: &[f64]) -> Result<f64> {
        Ok(genes.iter().sum())
    }

    fn assert_sorted(pop: &[Individual<f64>]) {
        for pair in pop.windows(2) {
            assert!(pair[0].fitness() >= pair[1].fitness());
        }
    }

    #[test]
    fn test_initial_population_sorted() {
        let mut ga = GeneticAlgorithm::new(params(20, 5), sum, counter()).unwrap();
        assert!(ga.best_individual().is_none());
        ga.create_initial_population().unwrap();

        assert_eq!(ga.generation(), 1);
        assert_eq!(ga.population().len(), 20);
        assert_sorted(ga.population());
        let best = ga.best_individual().unwrap().fitness();
        assert!(ga.population().iter().all(|i| best >= i.fitness()));
        // counter genes: the last individual drawn has the largest sum
        assert_eq!(ga.best_individual().unwrap().genes(), &[96.0, 97.0, 98.0, 99.0, 100.0]);
    }

    #[test]
    fn test_elites_survive_unchanged() {
        let p = GaParams {
            transfer_ratio: 30,
            mutate_probability: 20,
            ..params(10, 4)
        };
        let mut ga = GeneticAlgorithm::new(p, sum, counter()).unwrap();
        ga.create_initial_population().unwrap();
        let elites: Vec<Individual<f64>> = ga.population()[..3].to_vec();

        ga.create_next_population().unwrap();

        assert_eq!(ga.generation(), 2);
        assert_eq!(ga.population().len(), 10);
        assert_sorted(ga.population());
        for e in &elites {
            assert!(ga.population().iter().any(|i| i == e));
        }
    }

    #[test]
    fn test_weak_half_is_bred_out() {
        let p = GaParams {
            transfer_ratio: 50,
            crossover_ratio: 50,
            mutate_probability: 0,
            ..params(4, 1)
        };
        let mut ga = GeneticAlgorithm::new(p, |g: &[f64]| Ok(g[0]), counter()).unwrap();
        ga.create_initial_population().unwrap();
        let genes: Vec<f64> = ga.population().iter().map(|i| i.genes()[0]).collect();
        assert_eq!(genes, vec![4.0, 3.0, 2.0, 1.0]);

        ga.create_next_population().unwrap();

        for ind in ga.population() {
            assert!(ind.genes()[0] == 4.0 || ind.genes()[0] == 3.0);
        }
        assert_eq!(ga.best_individual().unwrap().fitness(), 4.0);
    }

    #[test]
    fn test_full_mutation_draws_fresh_genes() {
        let p = GaParams {
            transfer_ratio: 0,
            mutate_probability: 100,
            ..params(6, 3)
        };
        let mut ga = GeneticAlgorithm::new(p, sum, counter()).unwrap();
        ga.create_initial_population().unwrap();
        ga.create_next_population().unwrap();
        // 18 genes were drawn for generation 1, every later gene is fresh
        assert!(ga.population().iter().flat_map(|i| i.genes()).all(|g| *g > 18.0));
    }

    #[test]
    fn test_same_seed_same_evolution() {
        let run = || {
            let mut rng = SmallRng::seed_from_u64(5);
            let mut ga = GeneticAlgorithm::new(
                GaParams {
                    mutate_probability: 10,
                    ..params(12, 6)
                },
                |g: &[f64]| Ok(-g.iter().map(|x| x * x).sum::<f64>()),
                move || rng.gen_range(-1.0..1.0),
            )
            .unwrap();
            ga.create_initial_population().unwrap();
            for _ in 0..5 {
                ga.create_next_population().unwrap();
            }
            ga.population().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_fitness_improves_monotonically_with_elitism() {
        let mut rng = SmallRng::seed_from_u64(9);
        let mut ga = GeneticAlgorithm::new(
            GaParams {
                mutate_probability: 5,
                ..params(30, 8)
            },
            |g: &[f64]| Ok(-g.iter().map(|x| (x - 0.5).powi(2)).sum::<f64>()),
            move || rng.gen_range(-1.0..1.0),
        )
        .unwrap();
        ga.create_initial_population().unwrap();
        let mut best = ga.best_individual().unwrap().fitness();
        for _ in 0..20 {
            ga.create_next_population().unwrap();
            let now = ga.best_individual().unwrap().fitness();
            assert!(now >= best);
            best = now;
        }
        let stats = ga.stats().unwrap();
        assert_eq!(stats.generation, 21);
        assert!(stats.best >= stats.mean && stats.mean >= stats.worst);
    }

    #[test]
    fn test_next_before_initial_fails() {
        let mut ga = GeneticAlgorithm::new(params(4, 1), sum, counter()).unwrap();
        assert!(matches!(ga.create_next_population(), Err(Error::EmptyPopulation)));
    }

    #[test]
    fn test_fitness_error_propagates() {
        let mut ga = GeneticAlgorithm::new(
            params(8, 2),
            |g: &[f64]| {
                if g[0] > 10.0 {
                    Err(Error::Fitness("too big".into()))
                } else {
                    Ok(g[0])
                }
            },
            counter(),
        )
        .unwrap();
        assert!(matches!(ga.create_initial_population(), Err(Error::Fitness(_))));
    }

    #[test]
    fn test_fitness_panic_propagates() {
        let mut ga = GeneticAlgorithm::new(
            params(4, 1),
            |g: &[f64]| -> Result<f64> {
                if g[0] == 3.0 {
                    panic!("controller exploded");
                }
                Ok(g[0])
            },
            counter(),
        )
        .unwrap();
        assert!(matches!(ga.create_initial_population(), Err(Error::TaskPanicked(_))));
    }

    #[test]
    fn test_invalid_params() {
        let cases = [
            GaParams { population_size: 0, ..params(4, 1) },
            GaParams { genetic_length: 0, ..params(4, 1) },
            GaParams { parent_ratio: 101, ..params(4, 1) },
            GaParams { crossover_ratio: 10, ..params(4, 1) },
            GaParams { threads: Some(0), ..params(4, 1) },
        ];
        for p in cases {
            assert!(matches!(
                GeneticAlgorithm::new(p, sum, counter()),
                Err(Error::InvalidConfig(_))
            ));
        }
    }
}
