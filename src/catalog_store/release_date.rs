use super::error::CatalogError;
use super::models::ReleaseDatePrecision;
use chrono::NaiveDate;

/// Turns a provider release date (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`) into a
/// calendar date, padding missing parts with the first month/day.
///
/// When `precision` is absent it is inferred from the string length.
pub fn normalize_release_date(
    raw: Option<&str>,
    precision: Option<&str>,
) -> Result<(NaiveDate, ReleaseDatePrecision), CatalogError> {
    let raw = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => {
            return Err(CatalogError::InvalidReleaseDate(
                "release date is required".to_string(),
            ))
        }
    };

    let precision = match precision {
        Some(p) => ReleaseDatePrecision::from_db_str(p).ok_or_else(|| {
            CatalogError::InvalidReleaseDate(format!("unknown precision '{}'", p))
        })?,
        None => match raw.len() {
            4 => ReleaseDatePrecision::Year,
            7 => ReleaseDatePrecision::Month,
            _ => ReleaseDatePrecision::Day,
        },
    };

    let invalid = || CatalogError::InvalidReleaseDate(format!("'{}' is not a valid date", raw));
    let date = match precision {
        ReleaseDatePrecision::Year => {
            let year: i32 = raw.parse().map_err(|_| invalid())?;
            NaiveDate::from_ymd_opt(year, 1, 1)
        }
        ReleaseDatePrecision::Month => {
            let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let month: u32 = month.parse().map_err(|_| invalid())?;
            NaiveDate::from_ymd_opt(year, month, 1)
        }
        ReleaseDatePrecision::Day => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
    }
    .ok_or_else(invalid)?;

    Ok((date, precision))
}
