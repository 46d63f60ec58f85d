use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static US_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").unwrap());
static ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());

/// Parse a date column header: `M/D/YY` (as published), `M/D/YYYY` or `YYYY-MM-DD`.
/// Two-digit years are 20YY.
pub fn parse_header_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(c) = US_SHORT.captures(s) {
        let month: u32 = c[1].parse().ok()?;
        let day: u32 = c[2].parse().ok()?;
        let mut year: i32 = c[3].parse().ok()?;
        if c[3].len() == 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if let Some(c) = ISO.captures(s) {
        let year: i32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let day: u32 = c[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn published_format() {
        assert_eq!(parse_header_date("1/22/20"), Some(ymd(2020, 1, 22)));
        assert_eq!(parse_header_date("12/31/22"), Some(ymd(2022, 12, 31)));
        assert_eq!(parse_header_date(" 3/9/23 "), Some(ymd(2023, 3, 9)));
    }

    #[test]
    fn long_forms() {
        assert_eq!(parse_header_date("2/29/2020"), Some(ymd(2020, 2, 29)));
        assert_eq!(parse_header_date("2021-07-04"), Some(ymd(2021, 7, 4)));
    }

    #[test]
    fn rejects_non_dates() {
        assert_eq!(parse_header_date("Lat"), None);
        assert_eq!(parse_header_date("2/30/20"), None);
        assert_eq!(parse_header_date("13/1/20"), None);
        assert_eq!(parse_header_date("1/22/020"), None);
        assert_eq!(parse_header_date("2021/07/04"), None);
    }
}
