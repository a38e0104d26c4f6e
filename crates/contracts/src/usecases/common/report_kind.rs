use serde::{Deserialize, Serialize};

/// Виды отчётов, которые пишутся в таблицу магазина
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// u601: юнит-экономика по дням
    UnitDay,
    /// u602: расходы на рекламу (Performance API)
    AdSpend,
    /// u603: остатки, возвраты, статусы FBO
    Balance,
    /// u604: недельный финансовый отчёт
    FinWeek,
}

impl ReportKind {
    pub fn code(&self) -> &'static str {
        match self {
            ReportKind::UnitDay => "unit_day",
            ReportKind::AdSpend => "ad_spend",
            ReportKind::Balance => "balance",
            ReportKind::FinWeek => "fin_week",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "unit_day" | "unit-day" => Some(ReportKind::UnitDay),
            "ad_spend" | "ads" => Some(ReportKind::AdSpend),
            "balance" | "balans" => Some(ReportKind::Balance),
            "fin_week" | "week_fin" => Some(ReportKind::FinWeek),
            _ => None,
        }
    }

    /// Подпись для сообщений в чате
    pub fn display_name(&self) -> &'static str {
        match self {
            ReportKind::UnitDay => "unit-day",
            ReportKind::AdSpend => "ads",
            ReportKind::Balance => "balans",
            ReportKind::FinWeek => "week-fin",
        }
    }

    /// Ориентировочная длительность, показывается пользователю
    pub fn estimate(&self) -> &'static str {
        match self {
            ReportKind::UnitDay => "≈2 мин",
            ReportKind::AdSpend => "до 1 часа",
            ReportKind::Balance => "≈3 мин",
            ReportKind::FinWeek => "≈5 мин",
        }
    }

    /// Лист, в который пишет отчёт
    pub fn default_worksheet(&self) -> &'static str {
        match self {
            ReportKind::UnitDay | ReportKind::AdSpend => "unit-day",
            ReportKind::Balance => "balans_1",
            ReportKind::FinWeek => "week_fin",
        }
    }

    /// Цепочка, которую автоцикл ставит в очередь магазина
    pub fn auto_chain() -> [ReportKind; 2] {
        [ReportKind::UnitDay, ReportKind::AdSpend]
    }

    pub fn all() -> [ReportKind; 4] {
        [
            ReportKind::UnitDay,
            ReportKind::AdSpend,
            ReportKind::Balance,
            ReportKind::FinWeek,
        ]
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| format!("Unknown report kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for kind in ReportKind::all() {
            assert_eq!(ReportKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!("unit-day".parse::<ReportKind>(), Ok(ReportKind::UnitDay));
        assert!("nope".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_ad_spend_writes_into_unit_day_sheet() {
        assert_eq!(
            ReportKind::AdSpend.default_worksheet(),
            ReportKind::UnitDay.default_worksheet()
        );
    }
}
