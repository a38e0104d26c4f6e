//! Разбор выгрузки статистики Performance API: ZIP с CSV или голый CSV

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use crate::shared::format::{parse_num_opt, parse_sku};
use crate::shared::marketplaces::ozon::performance_api::ReportFile;

const COL_DAY: &str = "День";
const COL_SKU: &str = "sku";
const COL_SPEND: &str = "Расход, ₽, с НДС";
const SUMMARY_ROW: &str = "Всего";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Строка расхода из CSV кампании
#[derive(Debug, Clone, PartialEq)]
pub struct SpendRow {
    /// Дата как в отчёте: `dd.mm.yyyy`
    pub day: String,
    pub sku: i64,
    pub spend: f64,
}

/// (день, SKU) → расход
pub type SpendByDaySku = BTreeMap<(String, i64), f64>;

/// Тексты CSV внутри скачанного файла.
/// ZIP распаковывается (только `.csv` / `.txt`), CSV отдаётся как есть,
/// прочее пропускается.
pub fn report_texts(file: &ReportFile) -> Result<Vec<String>> {
    if file.bytes.starts_with(ZIP_MAGIC) || file.content_type.contains("zip") {
        let mut archive =
            zip::ZipArchive::new(Cursor::new(&file.bytes)).context("zip open error")?;
        let mut texts = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).context("zip entry error")?;
            let name = entry.name().to_lowercase();
            if !(name.ends_with(".csv") || name.ends_with(".txt")) {
                continue;
            }
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .with_context(|| format!("zip read error: {}", entry.name()))?;
            texts.push(String::from_utf8_lossy(&buf).into_owned());
        }
        return Ok(texts);
    }

    if file.content_type.contains("csv") || file.content_type.starts_with("text/") {
        return Ok(vec![String::from_utf8_lossy(&file.bytes).into_owned()]);
    }

    tracing::warn!("[ads] unexpected report content type: {}", file.content_type);
    Ok(Vec::new())
}

/// Разобрать CSV одной кампании. Первая строка – заголовок отчёта,
/// вторая – шапка колонок; разделитель `;`
pub fn parse_statistics_csv(text: &str) -> Result<Vec<SpendRow>> {
    let text = text.trim_start_matches('\u{FEFF}');
    let body = match text.split_once('\n') {
        Some((_, rest)) => rest,
        None => return Ok(Vec::new()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    let column = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| anyhow::anyhow!("В отчёте нет колонки «{}»", name))
    };
    let (day_col, sku_col, spend_col) = (column(COL_DAY)?, column(COL_SKU)?, column(COL_SPEND)?);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("[ads] skipping malformed CSV record: {}", e);
                continue;
            }
        };
        let day = record.get(day_col).unwrap_or_default().trim();
        if day.is_empty() || day == SUMMARY_ROW {
            continue;
        }
        let Some(sku) = record.get(sku_col).and_then(parse_sku) else {
            continue;
        };
        let spend = record
            .get(spend_col)
            .and_then(parse_num_opt)
            .unwrap_or(0.0);
        rows.push(SpendRow {
            day: day.to_string(),
            sku,
            spend,
        });
    }
    Ok(rows)
}

/// Сумма расходов по (день, SKU)
pub fn aggregate(rows: impl IntoIterator<Item = SpendRow>) -> SpendByDaySku {
    let mut out = SpendByDaySku::new();
    for row in rows {
        *out.entry((row.day, row.sku)).or_insert(0.0) += row.spend;
    }
    out
}
