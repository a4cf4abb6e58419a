//! Current-condition hazard alerts.

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::forecast::CurrentConditions;
use crate::services::settings::WeatherSettings;

/// Degrees °F beyond a temperature threshold at which an alert becomes `danger`.
pub const TEMP_DANGER_MARGIN_F: f64 = 10.0;

/// mph beyond the wind cutoff at which an alert becomes `danger`.
pub const WIND_DANGER_MARGIN_MPH: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cold,
    Heat,
    Wind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    /// Observed value (°F or mph)
    pub value: f64,
    /// Configured threshold that was crossed
    pub threshold: f64,
    pub message: String,
}

pub fn get_alerts(current: &CurrentConditions, settings: &WeatherSettings) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let temp = current.temp_f;

    if temp < settings.cold_alert_temp_f {
        let cold = settings.cold_alert_temp_f;
        alerts.push(Alert {
            kind: AlertKind::Cold,
            severity: severity_for(cold - temp, TEMP_DANGER_MARGIN_F),
            value: temp,
            threshold: cold,
            message: format!(
                "Cold: {:.0}°F is below {:.0}°F. Blanket and check water for freezing.",
                temp, cold
            ),
        });
    }

    if temp > settings.heat_alert_temp_f {
        let heat = settings.heat_alert_temp_f;
        alerts.push(Alert {
            kind: AlertKind::Heat,
            severity: severity_for(temp - heat, TEMP_DANGER_MARGIN_F),
            value: temp,
            threshold: heat,
            message: format!(
                "Heat: {:.0}°F is above {:.0}°F. Limit work and provide shade and water.",
                temp, heat
            ),
        });
    }

    let wind = current.wind_speed_mph;
    if wind > settings.wind_cutoff_mph {
        let cutoff = settings.wind_cutoff_mph;
        alerts.push(Alert {
            kind: AlertKind::Wind,
            severity: severity_for(wind - cutoff, WIND_DANGER_MARGIN_MPH),
            value: wind,
            threshold: cutoff,
            message: format!("High wind: {:.0} mph exceeds {:.0} mph.", wind, cutoff),
        });
    }

    alerts
}

fn severity_for(excess: f64, danger_margin: f64) -> AlertSeverity {
    if excess >= danger_margin {
        AlertSeverity::Danger
    } else {
        AlertSeverity::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::forecast::fixtures::*;

    fn current(temp_f: f64, wind: f64) -> CurrentConditions {
        let mut c = current_at(at(date(2026, 1, 10), 15, 0));
        c.temp_f = temp_f;
        c.wind_speed_mph = wind;
        c
    }

    #[test]
    fn test_mild_conditions_no_alerts() {
        assert!(get_alerts(&current(60.0, 10.0), &WeatherSettings::default()).is_empty());
    }

    #[test]
    fn test_boundaries_are_exclusive() {
        let s = WeatherSettings::default();
        assert!(get_alerts(&current(s.cold_alert_temp_f, 5.0), &s).is_empty());
        assert!(get_alerts(&current(s.heat_alert_temp_f, 5.0), &s).is_empty());
        assert!(get_alerts(&current(60.0, s.wind_cutoff_mph), &s).is_empty());
    }

    #[test]
    fn test_cold_escalates_to_danger() {
        let s = WeatherSettings::default();
        let alerts = get_alerts(&current(28.0, 5.0), &s);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Cold);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);

        let alerts = get_alerts(&current(15.0, 5.0), &s);
        assert_eq!(alerts[0].severity, AlertSeverity::Danger);
        assert_eq!(alerts[0].threshold, s.cold_alert_temp_f);
        assert_eq!(alerts[0].value, 15.0);
    }

    #[test]
    fn test_heat_and_wind_together() {
        let s = WeatherSettings::default();
        let alerts = get_alerts(&current(101.0, 40.0), &s);
        let kinds: Vec<_> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::Heat, AlertKind::Wind]);
        assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Danger));
    }
}
