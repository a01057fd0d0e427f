//! Risk profile sampler
//!
//! Generates synthetic behavior records whose joint distribution encodes ABA
//! heuristics about what drives escalation: poor sleep, long gaps since meals
//! and voids, toileting accidents, major transitions, crowded settings and
//! hot, humid or stormy weather.
//!
//! Generation is fully determined by `(seed, samples, variability)`.

use crate::error::ForecastError;
use crate::types::{BehaviorSample, Variability};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Default number of generated samples
pub const DEFAULT_SAMPLES: usize = 7000;

/// Default generator seed
pub const DEFAULT_SEED: u64 = 42;

const SLEEP_PROBS: [f64; 3] = [0.2, 0.45, 0.35];
const WEEKDAY_PROBS: [f64; 7] = [0.17, 0.17, 0.17, 0.16, 0.16, 0.09, 0.08];
const WEATHER_PROBS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];
const TRANSITION_PROBS: [f64; 4] = [0.35, 0.35, 0.2, 0.1];
const SOCIAL_CONTEXT_PROBS: [f64; 4] = [0.3, 0.25, 0.3, 0.15];
const ANTECEDENT_PROBS: [f64; 4] = [0.25, 0.25, 0.25, 0.25];
const FUNCTION_PROBS: [f64; 4] = [0.2, 0.3, 0.25, 0.25];

/// Awake hours, as minute of day
const TIME_OF_DAY_RANGE: std::ops::Range<i64> = 360..1440;

const MEAL_GAP_MEAN_MIN: f64 = 150.0;
const MEAL_GAP_SD_MIN: f64 = 65.0;
const MEAL_GAP_BOUNDS: (f64, f64) = (15.0, 360.0);

const VOID_GAP_MEAN_MIN: f64 = 80.0;
const VOID_GAP_SD_MIN: f64 = 40.0;
const VOID_GAP_BOUNDS: (f64, f64) = (10.0, 210.0);

/// Void gap above which accidents become likely
const LONG_VOID_GAP_MIN: i64 = 120;
const LONG_GAP_ACCIDENT_PROB: f64 = 0.45;
const BASELINE_ACCIDENT_PROB: f64 = 0.08;

const TOILETING_MEAN: f64 = 1.2;
const TOILETING_SD: f64 = 0.9;

const RISK_NOISE_SD: f64 = 0.05;

/// Temperature and humidity ranges (inclusive) for one weather bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherProfile {
    pub temperature_c: (i64, i64),
    pub humidity_percent: (i64, i64),
}

/// Ranges per weather bucket: clear, cloudy, rain, storm
pub const WEATHER_PROFILES: [WeatherProfile; 4] = [
    WeatherProfile {
        temperature_c: (16, 26),
        humidity_percent: (40, 65),
    },
    WeatherProfile {
        temperature_c: (18, 28),
        humidity_percent: (55, 80),
    },
    WeatherProfile {
        temperature_c: (20, 30),
        humidity_percent: (60, 90),
    },
    WeatherProfile {
        temperature_c: (22, 34),
        humidity_percent: (70, 100),
    },
];

/// Topography vocabulary indexed by inferred function
const TOPOGRAPHY_BY_FUNCTION: [[&str; 2]; 4] = [
    ["self_injury", "head_banging"],
    ["screaming", "throwing_objects"],
    ["elopement", "throwing_objects"],
    ["biting", "property_destruction"],
];

/// Sampler settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub samples: usize,
    pub seed: u64,
    pub variability: Variability,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: DEFAULT_SEED,
            variability: Variability::Baseline,
        }
    }
}

/// Situational fields drawn before the latent risk is computed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Situation {
    pub sleep_quality: i64,
    pub time_of_day: i64,
    pub weekday: i64,
    pub weather_type: i64,
    pub temperature_c: i64,
    pub humidity_percent: i64,
    pub meal_gap_min: i64,
    pub void_gap_min: i64,
    pub recent_accident: bool,
    pub toileting_bucket: i64,
    pub transition_type: i64,
    pub social_context: i64,
    pub antecedent: i64,
    pub function: i64,
}

struct DiscreteTables {
    sleep: WeightedIndex<f64>,
    weekday: WeightedIndex<f64>,
    weather: WeightedIndex<f64>,
    transition: WeightedIndex<f64>,
    social: WeightedIndex<f64>,
    antecedent: WeightedIndex<f64>,
    function: WeightedIndex<f64>,
}

impl DiscreteTables {
    fn new() -> Result<Self, ForecastError> {
        let table = |name: &str, probs: &[f64]| {
            WeightedIndex::new(probs)
                .map_err(|e| ForecastError::InvalidConfig(format!("{name} table: {e}")))
        };

        Ok(Self {
            sleep: table("sleep quality", &SLEEP_PROBS)?,
            weekday: table("weekday", &WEEKDAY_PROBS)?,
            weather: table("weather type", &WEATHER_PROBS)?,
            transition: table("transition type", &TRANSITION_PROBS)?,
            social: table("social context", &SOCIAL_CONTEXT_PROBS)?,
            antecedent: table("antecedent category", &ANTECEDENT_PROBS)?,
            function: table("inferred function", &FUNCTION_PROBS)?,
        })
    }
}

/// Seeded generator of synthetic behavior records
pub struct RiskProfileSampler {
    rng: ChaCha8Rng,
    spread: f64,
    tables: DiscreteTables,
}

impl RiskProfileSampler {
    /// Create a sampler for the given seed and variability
    pub fn new(seed: u64, variability: Variability) -> Result<Self, ForecastError> {
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            spread: variability.spread(),
            tables: DiscreteTables::new()?,
        })
    }

    /// Draw the next record
    pub fn sample(&mut self) -> BehaviorSample {
        let situation = self.draw_situation();

        let noise = normal(&mut self.rng, 0.0, RISK_NOISE_SD);
        let risk = (base_risk(&situation) + noise).clamp(0.0, 1.0);
        let mut behaviour_level = behaviour_level_for(risk);

        let probability = escalation_probability(
            risk,
            situation.recent_accident,
            situation.transition_type,
            behaviour_level,
        );
        let escalated = self.rng.gen::<f64>() < probability;

        if escalated && behaviour_level < 2 {
            behaviour_level = 2;
        }

        let behaviour_topography = if escalated {
            self.choose_topography(situation.function)
        } else {
            String::new()
        };

        BehaviorSample {
            sleep_quality_numeric: situation.sleep_quality,
            time_numeric: situation.time_of_day,
            weekday_numeric: situation.weekday,
            temperature_c: situation.temperature_c,
            humidity_percent: situation.humidity_percent,
            weather_type_numeric: situation.weather_type,
            time_since_last_meal_min: situation.meal_gap_min,
            time_since_last_void_min: situation.void_gap_min,
            recent_accident_flag: i64::from(situation.recent_accident),
            toileting_status_bucket_numeric: situation.toileting_bucket,
            transition_type_numeric: situation.transition_type,
            social_context_numeric: situation.social_context,
            antecedent_category_numeric: situation.antecedent,
            function_inferred_numeric: situation.function,
            behaviour_level,
            escalation_label: i64::from(escalated),
            behaviour_topography,
        }
    }

    fn draw_situation(&mut self) -> Situation {
        let rng = &mut self.rng;
        let tables = &self.tables;

        let sleep_quality = tables.sleep.sample(rng) as i64;
        let time_of_day = rng.gen_range(TIME_OF_DAY_RANGE);
        let weekday = tables.weekday.sample(rng) as i64;

        let weather_type = tables.weather.sample(rng);
        let profile = WEATHER_PROFILES[weather_type];
        let temperature_c = rng.gen_range(profile.temperature_c.0..=profile.temperature_c.1);
        let humidity_percent =
            rng.gen_range(profile.humidity_percent.0..=profile.humidity_percent.1);

        let meal_gap_min = normal(rng, MEAL_GAP_MEAN_MIN, MEAL_GAP_SD_MIN * self.spread)
            .clamp(MEAL_GAP_BOUNDS.0, MEAL_GAP_BOUNDS.1) as i64;
        let void_gap_min = normal(rng, VOID_GAP_MEAN_MIN, VOID_GAP_SD_MIN * self.spread)
            .clamp(VOID_GAP_BOUNDS.0, VOID_GAP_BOUNDS.1) as i64;

        // The baseline draw happens whenever the long-gap draw did not fire
        let recent_accident = (void_gap_min > LONG_VOID_GAP_MIN
            && rng.gen::<f64>() < LONG_GAP_ACCIDENT_PROB)
            || rng.gen::<f64>() < BASELINE_ACCIDENT_PROB;

        let toileting_bucket =
            normal(rng, TOILETING_MEAN, TOILETING_SD * self.spread).clamp(0.0, 3.0) as i64;

        Situation {
            sleep_quality,
            time_of_day,
            weekday,
            weather_type: weather_type as i64,
            temperature_c,
            humidity_percent,
            meal_gap_min,
            void_gap_min,
            recent_accident,
            toileting_bucket,
            transition_type: tables.transition.sample(rng) as i64,
            social_context: tables.social.sample(rng) as i64,
            antecedent: tables.antecedent.sample(rng) as i64,
            function: tables.function.sample(rng) as i64,
        }
    }

    fn choose_topography(&mut self, function: i64) -> String {
        let options: &[&str] = usize::try_from(function)
            .ok()
            .and_then(|idx| TOPOGRAPHY_BY_FUNCTION.get(idx))
            .map(|opts| opts.as_slice())
            .unwrap_or(&["screaming"]);
        options
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("screaming")
            .to_string()
    }
}

/// Generate a full synthetic dataset
pub fn generate_samples(config: &SamplerConfig) -> Result<Vec<BehaviorSample>, ForecastError> {
    let mut sampler = RiskProfileSampler::new(config.seed, config.variability)?;
    let samples: Vec<BehaviorSample> = (0..config.samples).map(|_| sampler.sample()).collect();

    log::info!(
        "generated {} samples (seed={}, variability={})",
        samples.len(),
        config.seed,
        config.variability
    );
    Ok(samples)
}

/// Latent escalation risk before noise, weighted over every situational field
///
/// Formula:
/// ```text
/// risk = 0.1 + sleep_weight[sleep]
///      + 0.16 * min(meal_gap / 280, 1) + 0.14 * min(void_gap / 180, 1)
///      + 0.28 * accident + 0.06 * toileting + 0.07 * transition
///      + 0.045 * social + 0.06 * antecedent + 0.06 * function
///      + 0.08 * max(0, (temp - 24) / 10) + 0.07 * max(0, (humidity - 65) / 30)
///      + weather_weight[weather] + weekday bump + time-of-day bump
/// ```
pub fn base_risk(s: &Situation) -> f64 {
    let mut risk = 0.1;

    risk += match s.sleep_quality {
        0 => 0.38,
        1 => 0.22,
        _ => 0.12,
    };
    risk += (s.meal_gap_min as f64 / 280.0).min(1.0) * 0.16;
    risk += (s.void_gap_min as f64 / 180.0).min(1.0) * 0.14;
    if s.recent_accident {
        risk += 0.28;
    }
    risk += s.toileting_bucket as f64 * 0.06;
    risk += s.transition_type as f64 * 0.07;
    risk += s.social_context as f64 * 0.045;
    risk += s.antecedent as f64 * 0.06;
    risk += s.function as f64 * 0.06;
    risk += ((s.temperature_c as f64 - 24.0) / 10.0).max(0.0) * 0.08;
    risk += ((s.humidity_percent as f64 - 65.0) / 30.0).max(0.0) * 0.07;
    risk += match s.weather_type {
        1 => 0.02,
        2 => 0.05,
        3 => 0.1,
        _ => 0.0,
    };

    // Weekend staffing and novelty
    risk += if s.weekday >= 5 { 0.04 } else { 0.02 };

    risk += match s.time_of_day {
        720..=1020 => 0.05,
        t if t >= 1080 => 0.07,
        t if t <= 540 => 0.03,
        _ => 0.0,
    };

    risk
}

/// Map a latent risk to the ordinal behaviour level
pub fn behaviour_level_for(risk: f64) -> i64 {
    if risk >= 0.75 {
        3
    } else if risk >= 0.55 {
        2
    } else if risk >= 0.35 {
        1
    } else {
        0
    }
}

/// Probability that the record is labeled as an escalation
pub fn escalation_probability(
    risk: f64,
    recent_accident: bool,
    transition_type: i64,
    behaviour_level: i64,
) -> f64 {
    let mut probability = risk * 0.85;
    if recent_accident {
        probability += 0.12;
    }
    if transition_type == 3 {
        probability += 0.1;
    }
    if behaviour_level >= 3 {
        probability += 0.08;
    }
    probability.clamp(0.0, 1.0)
}

/// Gaussian draw via the Box-Muller transform
fn normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    // 1 - u keeps the argument of ln in (0, 1]
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + sd * z
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::write_samples;
    use pretty_assertions::assert_eq;

    fn config(samples: usize, seed: u64, variability: Variability) -> SamplerConfig {
        SamplerConfig {
            samples,
            seed,
            variability,
        }
    }

    fn calm_situation() -> Situation {
        Situation {
            sleep_quality: 2,
            time_of_day: 600,
            weekday: 1,
            weather_type: 0,
            temperature_c: 20,
            humidity_percent: 50,
            meal_gap_min: 0,
            void_gap_min: 0,
            recent_accident: false,
            toileting_bucket: 0,
            transition_type: 0,
            social_context: 0,
            antecedent: 0,
            function: 0,
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let table_bytes = |seed: u64, name: &str| {
            let samples = generate_samples(&config(500, seed, Variability::Baseline)).unwrap();
            let path = dir.path().join(name);
            write_samples(&samples, &path).unwrap();
            std::fs::read(path).unwrap()
        };

        let first = table_bytes(7, "first.csv");
        let second = table_bytes(7, "second.csv");
        assert!(first == second, "same seed produced different tables");

        let other_seed = table_bytes(8, "other.csv");
        assert!(first != other_seed);
    }

    #[test]
    fn test_escalation_implies_high_behaviour_level() {
        let samples = generate_samples(&config(3000, 42, Variability::Wide)).unwrap();
        assert!(samples.iter().any(|s| s.escalation_label == 1));

        for sample in &samples {
            if sample.escalation_label == 1 {
                assert!(sample.behaviour_level >= 2);
                assert!(!sample.behaviour_topography.is_empty());
            } else {
                assert!(sample.behaviour_topography.is_empty());
            }
        }
    }

    #[test]
    fn test_field_ranges() {
        let samples = generate_samples(&config(3000, 3, Variability::Wide)).unwrap();

        for s in &samples {
            assert!((0..=2).contains(&s.sleep_quality_numeric));
            assert!((360..1440).contains(&s.time_numeric));
            assert!((0..=6).contains(&s.weekday_numeric));
            assert!((0..=3).contains(&s.weather_type_numeric));
            assert!((0..=3).contains(&s.toileting_status_bucket_numeric));
            assert!((0..=1).contains(&s.recent_accident_flag));
            assert!((15..=360).contains(&s.time_since_last_meal_min));
            assert!((10..=210).contains(&s.time_since_last_void_min));
            assert!((0..=3).contains(&s.behaviour_level));

            let profile = WEATHER_PROFILES[s.weather_type_numeric as usize];
            assert!(s.temperature_c >= profile.temperature_c.0);
            assert!(s.temperature_c <= profile.temperature_c.1);
            assert!(s.humidity_percent >= profile.humidity_percent.0);
            assert!(s.humidity_percent <= profile.humidity_percent.1);
        }
    }

    #[test]
    fn test_topography_matches_function() {
        let samples = generate_samples(&config(2000, 11, Variability::Baseline)).unwrap();

        for s in samples.iter().filter(|s| s.escalation_label == 1) {
            let options = TOPOGRAPHY_BY_FUNCTION[s.function_inferred_numeric as usize];
            assert!(options.contains(&s.behaviour_topography.as_str()));
        }
    }

    #[test]
    fn test_variability_widens_meal_gap_spread() {
        let spread = |variability| {
            let samples = generate_samples(&config(4000, 5, variability)).unwrap();
            let n = samples.len() as f64;
            let mean = samples
                .iter()
                .map(|s| s.time_since_last_meal_min as f64)
                .sum::<f64>()
                / n;
            samples
                .iter()
                .map(|s| (s.time_since_last_meal_min as f64 - mean).powi(2))
                .sum::<f64>()
                / n
        };

        assert!(spread(Variability::Tight) < spread(Variability::Wide));
    }

    #[test]
    fn test_long_void_gaps_raise_accident_rate() {
        let samples = generate_samples(&config(6000, 21, Variability::Wide)).unwrap();
        let rate = |long: bool| {
            let group: Vec<_> = samples
                .iter()
                .filter(|s| (s.time_since_last_void_min > LONG_VOID_GAP_MIN) == long)
                .collect();
            group.iter().filter(|s| s.recent_accident_flag == 1).count() as f64
                / group.len() as f64
        };

        assert!(rate(true) > rate(false));
    }

    #[test]
    fn test_behaviour_level_thresholds() {
        assert_eq!(behaviour_level_for(0.0), 0);
        assert_eq!(behaviour_level_for(0.349), 0);
        assert_eq!(behaviour_level_for(0.35), 1);
        assert_eq!(behaviour_level_for(0.55), 2);
        assert_eq!(behaviour_level_for(0.75), 3);
        assert_eq!(behaviour_level_for(1.0), 3);
    }

    #[test]
    fn test_escalation_probability_bumps() {
        assert!((escalation_probability(0.5, false, 0, 1) - 0.425).abs() < 1e-9);
        assert!((escalation_probability(0.5, true, 0, 1) - 0.545).abs() < 1e-9);
        assert!((escalation_probability(0.5, false, 3, 1) - 0.525).abs() < 1e-9);
        assert!((escalation_probability(0.5, false, 0, 3) - 0.505).abs() < 1e-9);
        assert_eq!(escalation_probability(1.0, true, 3, 3), 1.0);
    }

    #[test]
    fn test_base_risk_weights() {
        let calm = calm_situation();
        // 0.1 base + 0.12 good sleep + 0.02 weekday, no time-of-day bump at 600
        assert!((base_risk(&calm) - 0.24).abs() < 1e-9);

        let poor_sleep = Situation {
            sleep_quality: 0,
            ..calm
        };
        assert!((base_risk(&poor_sleep) - base_risk(&calm) - 0.26).abs() < 1e-9);

        let accident = Situation {
            recent_accident: true,
            ..calm
        };
        assert!((base_risk(&accident) - base_risk(&calm) - 0.28).abs() < 1e-9);

        let evening_weekend = Situation {
            time_of_day: 1100,
            weekday: 6,
            ..calm
        };
        assert!((base_risk(&evening_weekend) - base_risk(&calm) - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_normal_draw_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let draws: Vec<f64> = (0..20_000).map(|_| normal(&mut rng, 10.0, 2.0)).collect();
        let n = draws.len() as f64;
        let mean = draws.iter().sum::<f64>() / n;
        let sd = (draws.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();

        assert!((mean - 10.0).abs() < 0.1);
        assert!((sd - 2.0).abs() < 0.1);
    }
}
