//! Utilidades de validación
//!
//! Este módulo contiene funciones helper para validación de datos
//! y conversión de tipos.

use chrono::NaiveDate;
use validator::ValidationError;

/// Máximo de días que acepta una consulta de reportes EOD
pub const MAX_REPORT_RANGE_DAYS: i64 = 31;

/// Validar y convertir string a fecha
pub fn validate_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        let mut error = ValidationError::new("date");
        error.add_param("value".into(), &value.to_string());
        error.add_param("format".into(), &"YYYY-MM-DD".to_string());
        error
    })
}

/// Validar una latitud WGS84
pub fn validate_latitude(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (-90.0..=90.0).contains(&value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("latitude");
        error.add_param("value".into(), &value);
        Err(error)
    }
}

/// Validar una longitud WGS84
pub fn validate_longitude(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && (-180.0..=180.0).contains(&value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("longitude");
        error.add_param("value".into(), &value);
        Err(error)
    }
}

/// Validar un rango de fechas inclusivo
pub fn validate_date_range(from: NaiveDate, to: NaiveDate) -> Result<(), ValidationError> {
    if to < from {
        let mut error = ValidationError::new("date_range");
        error.add_param("from".into(), &from.to_string());
        error.add_param("to".into(), &to.to_string());
        return Err(error);
    }
    if (to - from).num_days() >= MAX_REPORT_RANGE_DAYS {
        let mut error = ValidationError::new("date_range_too_wide");
        error.add_param("max_days".into(), &MAX_REPORT_RANGE_DAYS);
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2024-05-01").is_ok());
        assert!(validate_date("05/01/2024").is_err());
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_latitude(48.85).is_ok());
        assert!(validate_latitude(91.0).is_err());
        assert!(validate_latitude(f64::NAN).is_err());
        assert!(validate_longitude(-179.9).is_ok());
        assert!(validate_longitude(180.5).is_err());
    }

    #[test]
    fn test_validate_date_range() {
        let d = |s| validate_date(s).unwrap();
        assert!(validate_date_range(d("2024-05-01"), d("2024-05-01")).is_ok());
        assert!(validate_date_range(d("2024-05-03"), d("2024-05-01")).is_err());
        assert!(validate_date_range(d("2024-05-01"), d("2024-06-15")).is_err());
    }
}
