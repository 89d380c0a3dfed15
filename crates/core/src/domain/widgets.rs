use chrono::DateTime;
use chrono_tz::Tz;

/// One point of the complaints chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub taken_at: DateTime<Tz>,
    pub complaints: i64,
    pub failures: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudTag {
    pub word: String,
    /// Percent, two decimals.
    pub frequency: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramKind {
    Region,
    Cause,
    Device,
}

impl HistogramKind {
    pub fn label(self) -> &'static str {
        match self {
            HistogramKind::Region => "region",
            HistogramKind::Cause => "cause",
            HistogramKind::Device => "device",
        }
    }

    /// Name stored in the `type` column of exported tables.
    pub fn title(self) -> &'static str {
        match self {
            HistogramKind::Region => "Регион",
            HistogramKind::Cause => "Неполадка",
            HistogramKind::Device => "Устройство",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramEntry {
    pub kind: HistogramKind,
    pub name: String,
    pub percent: f64,
}

/// Parses "12,5 %" style values.
pub fn normalize_percent(raw: &str) -> Option<f64> {
    let cleaned = raw.replace('%', "").replace(',', ".");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::normalize_percent;

    #[test]
    fn percent_accepts_comma_and_sign() {
        assert_eq!(normalize_percent("12,5%"), Some(12.5));
        assert_eq!(normalize_percent(" 40 % "), Some(40.0));
    }

    #[test]
    fn percent_rejects_garbage() {
        assert_eq!(normalize_percent(""), None);
        assert_eq!(normalize_percent("%"), None);
        assert_eq!(normalize_percent("abc"), None);
        assert_eq!(normalize_percent("NaN"), None);
    }
}
