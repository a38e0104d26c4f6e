use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Смещение Москвы (UTC+3, без перехода на летнее время)
pub const MSK_OFFSET_HOURS: i64 = 3;

/// Форматирует число с разделителями тысяч (точками): 1234567 → "1.234.567"
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, ch) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('.');
        }
        result.push(ch);
    }
    result.chars().rev().collect()
}

/// Округление до копеек
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Число из ячейки таблицы: допускает запятую, пробелы и знак процента.
/// Нечисловое значение даёт 0.
pub fn parse_num(raw: &str) -> f64 {
    parse_num_opt(raw).map(round2).unwrap_or(0.0)
}

pub fn parse_num_opt(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// SKU из ячейки: "12345", "12345.0"
pub fn parse_sku(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }
    parse_num_opt(trimmed)
        .filter(|v| v.fract() == 0.0)
        .map(|v| v as i64)
}

/// Текущее московское время
pub fn msk_now() -> DateTime<FixedOffset> {
    to_msk(Utc::now())
}

pub fn to_msk(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    let offset =
        FixedOffset::east_opt((MSK_OFFSET_HOURS * 3600) as i32).unwrap_or_else(|| Utc.fix());
    ts.with_timezone(&offset)
}

/// Дата ключа строки листа: `dd.mm.yyyy`
pub fn ru_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Ключ даты из ячейки: всё до первого пробела
/// ("18.10.2026 (14:05 МСК)" → "18.10.2026")
pub fn date_key(cell: &str) -> &str {
    cell.trim().split(' ').next().unwrap_or_default()
}

/// ISO-метка для фильтров Ozon: `2024-05-01T00:00:00.000Z`
pub fn ozon_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Полночь дня по UTC
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1.000");
        assert_eq!(format_number(1234567890), "1.234.567.890");
    }

    #[test]
    fn test_parse_num() {
        assert_eq!(parse_num("12,346"), 12.35);
        assert_eq!(parse_num(" 7 % "), 7.0);
        assert_eq!(parse_num("1 200,5"), 1200.5);
        assert_eq!(parse_num(""), 0.0);
        assert_eq!(parse_num("abc"), 0.0);
        assert_eq!(parse_num_opt("-3.5"), Some(-3.5));
    }

    #[test]
    fn test_parse_sku() {
        assert_eq!(parse_sku("123"), Some(123));
        assert_eq!(parse_sku("123.0"), Some(123));
        assert_eq!(parse_sku("12.5"), None);
        assert_eq!(parse_sku("Итого"), None);
    }

    #[test]
    fn test_date_key() {
        assert_eq!(date_key("18.10.2026 (14:05 МСК)"), "18.10.2026");
        assert_eq!(date_key("17.10.2026"), "17.10.2026");
        assert_eq!(date_key(""), "");
    }

    #[test]
    fn test_to_msk_shifts_three_hours() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 17, 22, 30, 0).unwrap();
        let msk = to_msk(ts);
        assert_eq!(msk.format("%d.%m.%Y %H:%M").to_string(), "18.10.2026 01:30");
    }

    #[test]
    fn test_ozon_ts() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(ozon_ts(ts), "2024-05-01T00:00:00.000Z");
    }
}
