//! Адресация ячеек в нотации A1

/// Буква колонки по номеру (1 → A, 27 → AA)
pub fn col_letter(mut n: usize) -> String {
    let mut s = Vec::new();
    while n > 0 {
        let r = (n - 1) % 26;
        s.push(b'A' + r as u8);
        n = (n - 1) / 26;
    }
    s.reverse();
    String::from_utf8(s).unwrap_or_default()
}

/// Номер колонки по букве (A → 1). None для пустой или некорректной строки
pub fn col_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, ch| {
        let ch = ch.to_ascii_uppercase();
        ch.is_ascii_uppercase()
            .then(|| acc * 26 + (ch as usize - 'A' as usize + 1))
    })
}

/// Ячейка по 1-based координатам
pub fn cell(col: usize, row: usize) -> String {
    format!("{}{}", col_letter(col), row)
}

/// Строка целиком: `A{row}:{last}{row}`
pub fn row_range(row: usize, width: usize) -> String {
    format!("A{}:{}{}", row, col_letter(width.max(1)), row)
}

/// Разобрать ячейку `F12` в (колонка, строка), обе 1-based
pub fn parse_cell(a1: &str) -> Option<(usize, usize)> {
    let a1 = a1.trim();
    let split = a1.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = a1.split_at(split);
    let col = col_index(letters)?;
    let row = digits.parse::<usize>().ok().filter(|r| *r > 0)?;
    Some((col, row))
}

/// Левая верхняя ячейка диапазона (`A2:O9` → (1, 2)), имя листа отбрасывается
pub fn range_start(range: &str) -> Option<(usize, usize)> {
    let local = range.rsplit('!').next().unwrap_or(range);
    let first = local.split(':').next().unwrap_or(local);
    parse_cell(first)
}

/// Диапазон с именем листа в кавычках: `'unit-day'!A1`
pub fn qualified(title: &str, range: &str) -> String {
    format!("'{}'!{}", title.replace('\'', "''"), range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_col_letter() {
        assert_eq!(col_letter(1), "A");
        assert_eq!(col_letter(15), "O");
        assert_eq!(col_letter(26), "Z");
        assert_eq!(col_letter(27), "AA");
        assert_eq!(col_letter(703), "AAA");
    }

    #[test]
    fn test_col_index_inverts_letter() {
        for n in [1, 6, 26, 27, 52, 700] {
            assert_eq!(col_index(&col_letter(n)), Some(n));
        }
        assert_eq!(col_index(""), None);
        assert_eq!(col_index("A1"), None);
    }

    #[test]
    fn test_parse_cell_and_range() {
        assert_eq!(parse_cell("F12"), Some((6, 12)));
        assert_eq!(parse_cell("A0"), None);
        assert_eq!(parse_cell("12"), None);
        assert_eq!(range_start("'unit-day'!A2:O9"), Some((1, 2)));
        assert_eq!(range_start("C5"), Some((3, 5)));
    }

    #[test]
    fn test_row_range_and_qualified() {
        assert_eq!(row_range(4, 9), "A4:I4");
        assert_eq!(qualified("unit-day", "A1"), "'unit-day'!A1");
        assert_eq!(qualified("it's", "B2"), "'it''s'!B2");
    }
}
