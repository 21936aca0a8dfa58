//! Simulated-annealing coefficient tuning.
//!
//! Rulesets carry hand-picked score factors; this optimizer tunes them
//! offline against a corpus. It knows nothing about documents or rules: a
//! problem supplies a starting solution, a neighbor move, and a cost, and
//! [`Annealer::anneal`] searches.
//!
//! ```text
//! for each cooling step:
//!     repeatedly: draw a neighbor
//!         better  -> accept
//!         worse   -> accept with exp(Δ / (boltzmann · temperature))
//!     stop early once the step makes no progress
//!     temperature *= cooling_fraction
//! ```
//!
//! Progress (each new best solution) is reported through `tracing`; install
//! a subscriber to watch a long run converge.

/// A problem the annealer can search. Methods take `&mut self` so problems
/// may carry their own RNG or evaluation caches.
pub trait Annealable {
    type Solution: Clone;

    fn initial_solution(&mut self) -> Self::Solution;
    fn random_transition(&mut self, solution: &Self::Solution) -> Self::Solution;
    fn solution_cost(&mut self, solution: &Self::Solution) -> f64;
}

/// Simulated-annealing schedule parameters.
#[derive(Clone, Debug)]
pub struct Annealer {
    pub initial_temperature: f64,
    pub cooling_steps: usize,
    pub cooling_fraction: f64,
    pub steps_per_temp: usize,
    pub boltzmann: f64,
}

impl Default for Annealer {
    fn default() -> Self {
        Annealer {
            initial_temperature: 5000.0,
            cooling_steps: 5000,
            cooling_fraction: 0.95,
            steps_per_temp: 1000,
            boltzmann: 1.380_648_527_9e-23,
        }
    }
}

impl Annealer {
    /// Search `problem`, returning the best solution seen and its cost.
    pub fn anneal<P: Annealable>(&self, problem: &mut P) -> (P::Solution, f64) {
        let mut temperature = self.initial_temperature;
        let mut current = problem.initial_solution();
        let mut current_cost = problem.solution_cost(&current);
        let mut best = current.clone();
        let mut best_cost = current_cost;

        for step in 0..self.cooling_steps {
            let start_cost = current_cost;
            for _ in 0..self.steps_per_temp {
                let candidate = problem.random_transition(&current);
                let candidate_cost = problem.solution_cost(&candidate);
                if candidate_cost < current_cost {
                    current = candidate;
                    current_cost = candidate_cost;
                    if current_cost < best_cost {
                        best = current.clone();
                        best_cost = current_cost;
                        tracing::debug!(step, best_cost, "new best solution");
                    }
                } else {
                    let merit = ((current_cost - candidate_cost) / (self.boltzmann * temperature)).exp();
                    if merit > rand::random::<f64>() {
                        current = candidate;
                        current_cost = candidate_cost;
                    }
                }
                // No movement at this temperature; don't grind out the rest
                // of the inner loop.
                if current_cost == start_cost {
                    break;
                }
            }
            temperature *= self.cooling_fraction;
        }

        (best, best_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimize (x - 7)² over integer x, moving ±1 at a time.
    struct Parabola;

    impl Annealable for Parabola {
        type Solution = i64;

        fn initial_solution(&mut self) -> i64 {
            100
        }

        fn random_transition(&mut self, solution: &i64) -> i64 {
            if rand::random::<bool>() {
                solution + 1
            } else {
                solution - 1
            }
        }

        fn solution_cost(&mut self, solution: &i64) -> f64 {
            let gap = (*solution - 7) as f64;
            gap * gap
        }
    }

    #[test]
    fn anneal_descends_to_the_minimum() {
        let (best, best_cost) = Annealer::default().anneal(&mut Parabola);
        assert_eq!(best, 7);
        assert_eq!(best_cost, 0.0);
    }

    #[test]
    fn best_never_loses_to_the_start() {
        let annealer = Annealer { cooling_steps: 10, steps_per_temp: 10, ..Annealer::default() };
        let (_, best_cost) = annealer.anneal(&mut Parabola);
        let start_cost = Parabola.solution_cost(&Parabola.initial_solution());
        assert!(best_cost <= start_cost);
    }
}
