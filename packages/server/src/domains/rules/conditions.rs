//! Pure condition evaluation against a weather snapshot.
//!
//! Kept free of I/O so the same functions back live checks, dry runs, and
//! unit tests. A parameter the snapshot does not carry (OpenWeather omits
//! visibility for some stations) makes the condition false rather than
//! guessing.

use openweather::CurrentWeather;

use super::models::{
    ConditionGroup, ConditionLogic, ConditionOperator, LogicOperator, Rule, WeatherCondition,
    WeatherParameter,
};

/// `equals` tolerates readings within this absolute distance.
const EQUALS_TOLERANCE: f64 = 0.1;
/// Half-width used by `between` when the rule did not set one.
const DEFAULT_BETWEEN_RANGE: f64 = 5.0;

/// The snapshot value backing a parameter, when reported.
pub fn parameter_value(weather: &CurrentWeather, parameter: WeatherParameter) -> Option<f64> {
    match parameter {
        WeatherParameter::Temperature => Some(weather.temperature),
        WeatherParameter::Humidity => Some(weather.humidity),
        WeatherParameter::WindSpeed => Some(weather.wind_speed),
        WeatherParameter::Precipitation => Some(weather.precipitation),
        WeatherParameter::Visibility => weather.visibility,
        WeatherParameter::CloudCover => Some(weather.cloud_cover),
    }
}

pub fn evaluate_condition(condition: &WeatherCondition, weather: &CurrentWeather) -> bool {
    let Some(value) = parameter_value(weather, condition.parameter) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::GreaterThan => value > condition.value,
        ConditionOperator::LessThan => value < condition.value,
        ConditionOperator::Equals => (value - condition.value).abs() < EQUALS_TOLERANCE,
        ConditionOperator::Between => {
            let range = condition.range.unwrap_or(DEFAULT_BETWEEN_RANGE);
            condition.value - range <= value && value <= condition.value + range
        }
    }
}

/// Legacy flat list: conjunction of all conditions. An empty list never
/// matches, so a half-saved rule cannot fire on every tick.
pub fn evaluate_flat(conditions: &[WeatherCondition], weather: &CurrentWeather) -> bool {
    !conditions.is_empty() && conditions.iter().all(|c| evaluate_condition(c, weather))
}

fn evaluate_group(group: &ConditionGroup, weather: &CurrentWeather) -> bool {
    if group.conditions.is_empty() {
        return false;
    }
    match group.operator {
        LogicOperator::And => group.conditions.iter().all(|c| evaluate_condition(c, weather)),
        LogicOperator::Or => group.conditions.iter().any(|c| evaluate_condition(c, weather)),
    }
}

/// Nested logic: each group reduces via its operator, groups combine via
/// the global operator. An empty groups list never matches.
pub fn evaluate_logic(logic: &ConditionLogic, weather: &CurrentWeather) -> bool {
    if logic.groups.is_empty() {
        return false;
    }
    match logic.global_operator {
        LogicOperator::And => logic.groups.iter().all(|g| evaluate_group(g, weather)),
        LogicOperator::Or => logic.groups.iter().any(|g| evaluate_group(g, weather)),
    }
}

/// Evaluate whichever condition shape the rule carries. `condition_logic`
/// wins when present.
pub fn evaluate_rule(rule: &Rule, weather: &CurrentWeather) -> bool {
    match &rule.condition_logic {
        Some(logic) => evaluate_logic(logic, weather),
        None => evaluate_flat(&rule.conditions, weather),
    }
}

/// How many individual conditions a rule evaluation touches (for metrics).
pub fn conditions_evaluated(rule: &Rule) -> u32 {
    match &rule.condition_logic {
        Some(logic) => logic
            .groups
            .iter()
            .map(|g| g.conditions.len())
            .sum::<usize>() as u32,
        None => rule.conditions.len() as u32,
    }
}
