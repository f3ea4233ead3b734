use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ModelError, Scores};
use crate::data::DiseaseOutcome;

const SUSCEPTIBLE: &str = "S";
const INFECTED: &str = "I";

/// A risk model based on the discrete-time SIR disease model.
///
/// Fitting estimates `beta`, the contact rate of infected individuals, by least squares on
/// `new infections over the lookahead window ~ beta * I * S / N`. The numerator and the
/// denominator of the estimator are kept separately so that estimates from several datasets
/// can be combined by summing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SirModel {
    /// Lookahead window in days, the timestep of the SIR difference equation.
    lookahead: u32,
    numerator: Option<f64>,
    denominator: Option<f64>,
}

impl Default for SirModel {
    fn default() -> Self {
        Self {
            lookahead: Self::DEFAULT_LOOKAHEAD,
            numerator: None,
            denominator: None,
        }
    }
}

impl SirModel {
    pub const DEFAULT_LOOKAHEAD: u32 = 7;

    /// Creates a model, either unfitted or with the given estimator parameters.
    ///
    /// # Errors
    /// Fails if only one of `numerator` and `denominator` is given.
    pub fn new(
        lookahead: u32,
        numerator: Option<f64>,
        denominator: Option<f64>,
    ) -> Result<Self, ModelError> {
        if numerator.is_some() != denominator.is_some() {
            return Err(ModelError::PartialParameters);
        }
        Ok(Self {
            lookahead,
            numerator,
            denominator,
        })
    }

    /// The estimated contact rate, if fitted.
    pub fn beta(&self) -> Option<f64> {
        match (self.numerator, self.denominator) {
            (Some(numerator), Some(denominator)) => Some(numerator / denominator),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<(f64, f64)> {
        self.numerator.zip(self.denominator)
    }

    pub fn set_params(&mut self, numerator: f64, denominator: f64) {
        self.numerator = Some(numerator);
        self.denominator = Some(denominator);
    }

    /// Estimates `beta` from a disease outcome time series.
    pub fn fit(&mut self, outcomes: &[DiseaseOutcome]) -> &mut Self {
        info!("identifying infection events");
        let mut infected_on: HashMap<&str, u32> = HashMap::new();
        for outcome in outcomes.iter().filter(|outcome| outcome.state == INFECTED) {
            let day = infected_on
                .entry(outcome.pid.as_str())
                .or_insert(outcome.day);
            *day = (*day).min(outcome.day);
        }

        info!("counting disease states per day");
        #[derive(Default)]
        struct DayCounts {
            susceptible: f64,
            infected: f64,
            population: f64,
        }
        let mut days: BTreeMap<u32, DayCounts> = BTreeMap::new();
        for outcome in outcomes {
            let counts = days.entry(outcome.day).or_default();
            counts.population += 1.;
            match outcome.state.as_str() {
                SUSCEPTIBLE => counts.susceptible += 1.,
                INFECTED => counts.infected += 1.,
                _ => {}
            }
        }

        info!("counting infection events in lookahead window");
        let kept = days.len().saturating_sub(self.lookahead as usize);
        let (mut numerator, mut denominator) = (0., 0.);
        for (&day, counts) in days.iter().take(kept) {
            let next_infections = infected_on
                .values()
                .filter(|&&infection| day < infection && infection <= day + self.lookahead)
                .count() as f64;
            let x = counts.infected * counts.susceptible / counts.population;
            numerator += x * next_infections;
            denominator += x * x;
        }
        self.set_params(numerator, denominator);
        self
    }

    /// Predicts the probability of infection over the lookahead window for every person
    /// present on the last day of the time series.
    pub fn predict(&self, outcomes: &[DiseaseOutcome]) -> Result<Scores, ModelError> {
        let beta = self.beta().ok_or(ModelError::NotFitted)?;
        let population = outcomes
            .iter()
            .map(|outcome| outcome.pid.as_str())
            .collect::<HashSet<_>>()
            .len();
        let last_day = match outcomes.iter().map(|outcome| outcome.day).max() {
            Some(day) => day,
            None => return Ok(Scores::default()),
        };
        let last: Vec<&DiseaseOutcome> = outcomes
            .iter()
            .filter(|outcome| outcome.day == last_day)
            .collect();
        let infected = last
            .iter()
            .filter(|outcome| outcome.state == INFECTED)
            .count();
        let probability = beta * infected as f64 / population as f64;
        Ok(Scores::constant(
            last.iter().map(|outcome| outcome.pid.clone()).collect(),
            probability,
        ))
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        serde_json::to_writer(BufWriter::new(File::create(path)?), self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Self::new(model.lookahead, model.numerator, model.denominator)
    }
}
