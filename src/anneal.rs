use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{AnnealError, NothingToDo};

const TARGET_ACCEPTANCE: f64 = 0.98;
const TEMPERATURE_STEP: f64 = 1.5;
const TEMPERATURE_FIGURES: i32 = 2;
const BOOTSTRAP_ATTEMPTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub tmax: f64,
    pub tmin: f64,
    pub steps: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    NothingToDo,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct AnnealOutcome<S> {
    /// Lowest-energy state seen, the starting state included.
    pub state: S,
    pub energy: f64,
    /// Last accepted state when the run ended.
    pub last: S,
    pub steps: usize,
    pub stop: StopReason,
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone)]
pub struct AutoOptions {
    pub exploration_steps: usize,
    pub updates: usize,
    pub max_search_rounds: usize,
    pub max_steps: Option<usize>,
}

impl Default for AutoOptions {
    fn default() -> Self {
        Self {
            exploration_steps: 2000,
            updates: 20,
            max_search_rounds: 64,
            max_steps: None,
        }
    }
}

pub fn metropolis_accept(delta: f64, temperature: f64, draw: f64) -> bool {
    delta <= 0.0 || (-delta / temperature).exp() >= draw
}

pub fn temperature_at(schedule: &Schedule, step: usize) -> f64 {
    if schedule.steps == 0 {
        return schedule.tmax;
    }
    let factor = -(schedule.tmax / schedule.tmin).ln();
    schedule.tmax * (factor * step as f64 / schedule.steps as f64).exp()
}

/// Round `x` to `digits` significant figures.
pub fn round_figures(x: f64, digits: i32) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }
    let places = digits - x.abs().log10().ceil() as i32;
    if places >= 0 {
        let scale = 10f64.powi(places);
        (x * scale).round() / scale
    } else {
        let scale = 10f64.powi(-places);
        (x / scale).round() * scale
    }
}

struct Best<S> {
    state: S,
    energy: f64,
}

impl<S: Clone> Best<S> {
    fn new(state: &S, energy: f64) -> Self {
        Self {
            state: state.clone(),
            energy,
        }
    }

    fn offer(&mut self, state: &S, energy: f64) {
        if energy < self.energy {
            self.state = state.clone();
            self.energy = energy;
        }
    }

    fn finish(
        self,
        last: S,
        steps: usize,
        stop: StopReason,
        schedule: Option<Schedule>,
    ) -> AnnealOutcome<S> {
        AnnealOutcome {
            state: self.state,
            energy: self.energy,
            last,
            steps,
            stop,
            schedule,
        }
    }
}

struct Exploration<S> {
    state: S,
    energy: f64,
    acceptance: f64,
    improvement: f64,
}

// Ends exploration early, carrying the last accepted state.
struct Interrupted<S> {
    stop: StopReason,
    state: S,
}

struct Discovery<S> {
    tmax: f64,
    tmin: f64,
    state: S,
}

#[derive(Default)]
struct Tally {
    trials: usize,
    accepts: usize,
    improves: usize,
}

impl Tally {
    fn record(&mut self, accepted: bool, delta: f64) {
        self.trials += 1;
        if accepted {
            self.accepts += 1;
            if delta < 0.0 {
                self.improves += 1;
            }
        }
    }

    fn rates(&self) -> (f64, f64) {
        let trials = self.trials.max(1) as f64;
        (self.accepts as f64 / trials, self.improves as f64 / trials)
    }
}

/// `mover` returns [`NothingToDo`] when the state cannot change at all.
/// Trial moves are applied to clones, so clones must be independent.
pub struct Annealer<E, M, R> {
    energy: E,
    mover: M,
    rng: R,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl<E, M, R: Rng> Annealer<E, M, R> {
    pub fn new(energy: E, mover: M, rng: R) -> Self {
        Self {
            energy,
            mover,
            rng,
            cancel: None,
            deadline: None,
        }
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn should_stop(&self) -> bool {
        if let Some(flag) = &self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn accepts(&mut self, delta: f64, temperature: f64) -> bool {
        // Only uphill moves consume a random draw.
        delta <= 0.0 || metropolis_accept(delta, temperature, self.rng.random::<f64>())
    }

    pub fn anneal<S>(
        &mut self,
        state: S,
        schedule: Schedule,
        updates: usize,
    ) -> Result<AnnealOutcome<S>, AnnealError>
    where
        S: Clone,
        E: Fn(&S) -> f64,
        M: FnMut(&mut S, &mut R) -> Result<(), NothingToDo>,
    {
        if !(schedule.tmin > 0.0) {
            return Err(AnnealError::NonPositiveMinTemperature(schedule.tmin));
        }
        if !(schedule.tmax > 0.0) {
            return Err(AnnealError::NonPositiveMaxTemperature(schedule.tmax));
        }

        let start = Instant::now();
        let mut current = state;
        let mut current_energy = (self.energy)(&current);
        let mut best = Best::new(&current, current_energy);
        let mut tally = Tally::default();
        let wavelength = if updates > 0 {
            schedule.steps as f64 / updates as f64
        } else {
            0.0
        };
        if updates > 0 {
            log_progress(schedule.tmax, current_energy, None, start, 0, schedule.steps);
        }

        let mut taken = 0;
        let mut stop = StopReason::Completed;
        for step in 1..=schedule.steps {
            if self.should_stop() {
                stop = StopReason::Cancelled;
                break;
            }
            let temperature = temperature_at(&schedule, step);
            let mut candidate = current.clone();
            if (self.mover)(&mut candidate, &mut self.rng).is_err() {
                stop = StopReason::NothingToDo;
                break;
            }
            taken = step;
            let energy = (self.energy)(&candidate);
            let delta = energy - current_energy;
            let accepted = self.accepts(delta, temperature);
            tally.record(accepted, delta);
            if accepted {
                current = candidate;
                current_energy = energy;
                best.offer(&current, current_energy);
            }
            if updates > 1
                && (step as f64 / wavelength).floor() > ((step - 1) as f64 / wavelength).floor()
            {
                log_progress(
                    temperature,
                    current_energy,
                    Some(tally.rates()),
                    start,
                    step,
                    schedule.steps,
                );
                tally = Tally::default();
            }
        }

        Ok(best.finish(current, taken, stop, Some(schedule)))
    }

    /// Discover a schedule, then anneal for roughly `minutes`.
    pub fn auto<S>(
        &mut self,
        state: S,
        minutes: f64,
        options: &AutoOptions,
    ) -> Result<AnnealOutcome<S>, AnnealError>
    where
        S: Clone,
        E: Fn(&S) -> f64,
        M: FnMut(&mut S, &mut R) -> Result<(), NothingToDo>,
    {
        let start = Instant::now();
        let mut state = state;
        let initial_energy = (self.energy)(&state);
        let mut best = Best::new(&state, initial_energy);
        let mut step = 0;

        log::info!("attempting automatic simulated anneal");

        // Random-walk until the energy moves at all; that change seeds T.
        let mut seed_temperature = 0.0;
        let mut energy = initial_energy;
        while seed_temperature == 0.0 {
            if self.should_stop() {
                return Ok(best.finish(state, 0, StopReason::Cancelled, None));
            }
            if step >= BOOTSTRAP_ATTEMPTS {
                log::warn!("energy did not change after {step} moves; nothing to anneal");
                return Ok(best.finish(state, 0, StopReason::NothingToDo, None));
            }
            step += 1;
            let mut candidate = state.clone();
            if (self.mover)(&mut candidate, &mut self.rng).is_err() {
                return Ok(best.finish(state, 0, StopReason::NothingToDo, None));
            }
            state = candidate;
            energy = (self.energy)(&state);
            best.offer(&state, energy);
            seed_temperature = (energy - initial_energy).abs();
        }

        let discovery = match self.discover(state, energy, seed_temperature, options, &mut best, &mut step)
        {
            Ok(discovery) => discovery,
            Err(Interrupted { stop, state }) => return Ok(best.finish(state, 0, stop, None)),
        };

        let elapsed = start.elapsed().max(Duration::from_micros(1)).as_secs_f64();
        let mut steps = round_figures((60.0 * minutes * step as f64 / elapsed).floor(), 2) as usize;
        if let Some(cap) = options.max_steps {
            steps = steps.min(cap);
        }
        let schedule = Schedule {
            tmax: discovery.tmax,
            tmin: discovery.tmin,
            steps: steps.max(1),
        };
        log::info!(
            "annealing schedule: tmax {:.3}, tmin {:.5}, {} steps",
            schedule.tmax,
            schedule.tmin,
            schedule.steps
        );

        let mut outcome = self.anneal(discovery.state, schedule, options.updates)?;
        if best.energy < outcome.energy {
            outcome.state = best.state;
            outcome.energy = best.energy;
        }
        Ok(outcome)
    }

    fn discover<S>(
        &mut self,
        state: S,
        energy: f64,
        seed_temperature: f64,
        options: &AutoOptions,
        best: &mut Best<S>,
        step: &mut usize,
    ) -> Result<Discovery<S>, Interrupted<S>>
    where
        S: Clone,
        E: Fn(&S) -> f64,
        M: FnMut(&mut S, &mut R) -> Result<(), NothingToDo>,
    {
        let steps = options.exploration_steps.max(1);
        let rounds = options.max_search_rounds.max(1);
        let mut temperature = seed_temperature;

        log::debug!("exploring temperature landscape from T {temperature:.5}");
        let mut run = self.explore(state, energy, temperature, steps, best)?;
        *step += steps;

        // Tmax: the temperature where ~98% of moves are accepted.
        let mut round = 0;
        while run.acceptance > TARGET_ACCEPTANCE && round < rounds {
            temperature = round_figures(temperature / TEMPERATURE_STEP, TEMPERATURE_FIGURES);
            run = self.explore(run.state, run.energy, temperature, steps, best)?;
            *step += steps;
            round += 1;
            log_exploration(temperature, &run);
        }
        while run.acceptance < TARGET_ACCEPTANCE && round < rounds {
            temperature = round_figures(temperature * TEMPERATURE_STEP, TEMPERATURE_FIGURES);
            run = self.explore(run.state, run.energy, temperature, steps, best)?;
            *step += steps;
            round += 1;
            log_exploration(temperature, &run);
        }
        if round >= rounds {
            log::warn!("gave up searching for tmax after {round} rounds at T {temperature:.5}");
        }
        let tmax = temperature;

        // Tmin: the temperature where moves stop improving the energy.
        round = 0;
        while run.improvement > 0.0 && round < rounds {
            temperature = round_figures(temperature / TEMPERATURE_STEP, TEMPERATURE_FIGURES);
            run = self.explore(run.state, run.energy, temperature, steps, best)?;
            *step += steps;
            round += 1;
            log_exploration(temperature, &run);
        }
        if round >= rounds {
            log::warn!("gave up searching for tmin after {round} rounds at T {temperature:.5}");
        }

        Ok(Discovery {
            tmax,
            tmin: temperature,
            state: run.state,
        })
    }

    fn explore<S>(
        &mut self,
        state: S,
        energy: f64,
        temperature: f64,
        steps: usize,
        best: &mut Best<S>,
    ) -> Result<Exploration<S>, Interrupted<S>>
    where
        S: Clone,
        E: Fn(&S) -> f64,
        M: FnMut(&mut S, &mut R) -> Result<(), NothingToDo>,
    {
        let mut state = state;
        let mut energy = energy;
        let mut tally = Tally::default();
        for _ in 0..steps {
            if self.should_stop() {
                return Err(Interrupted {
                    stop: StopReason::Cancelled,
                    state,
                });
            }
            let mut candidate = state.clone();
            if (self.mover)(&mut candidate, &mut self.rng).is_err() {
                return Err(Interrupted {
                    stop: StopReason::NothingToDo,
                    state,
                });
            }
            let candidate_energy = (self.energy)(&candidate);
            let delta = candidate_energy - energy;
            let accepted = self.accepts(delta, temperature);
            tally.record(accepted, delta);
            if accepted {
                state = candidate;
                energy = candidate_energy;
                best.offer(&state, energy);
            }
        }
        let (acceptance, improvement) = tally.rates();
        Ok(Exploration {
            state,
            energy,
            acceptance,
            improvement,
        })
    }
}

fn log_exploration<S>(temperature: f64, run: &Exploration<S>) {
    log::debug!(
        "T {:>12.5}  E {:>12.3}  accept {:>6.2}%  improve {:>6.2}%",
        temperature,
        run.energy,
        run.acceptance * 100.0,
        run.improvement * 100.0
    );
}

fn log_progress(
    temperature: f64,
    energy: f64,
    rates: Option<(f64, f64)>,
    start: Instant,
    step: usize,
    steps: usize,
) {
    let elapsed = start.elapsed().as_secs_f64();
    match rates {
        None => log::info!(
            "T {temperature:>12.5}  E {energy:>12.3}  elapsed {elapsed:>8.1}s  step 0/{steps}"
        ),
        Some((acceptance, improvement)) => {
            let remaining = if step > 0 {
                elapsed * (steps - step) as f64 / step as f64
            } else {
                0.0
            };
            log::info!(
                "T {:>12.5}  E {:>12.3}  accept {:>6.2}%  improve {:>6.2}%  elapsed {:>8.1}s  remaining {:>8.1}s",
                temperature,
                energy,
                acceptance * 100.0,
                improvement * 100.0,
                elapsed,
                remaining
            );
        }
    }
}
