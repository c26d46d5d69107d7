//! Flat CSV rendering of the ledger.

use chrono::SecondsFormat;
use ledger_sync::LedgerEntry;

pub const CSV_HEADER: &str = "Amount,Description,Category,Date";

/// Render `entries` as CSV, one row per entry in the given order.
pub fn export_csv(entries: &[LedgerEntry]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + entries.len() * 48);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&entry.amount.to_string());
        out.push(',');
        push_field(&mut out, &entry.description);
        out.push(',');
        out.push_str(entry.category.as_str());
        out.push(',');
        out.push_str(&entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true));
        out.push('\n');
    }
    out
}

fn push_field(out: &mut String, value: &str) {
    if value.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ledger_sync::Category;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn entry(amount: &str, description: &str, category: Category) -> LedgerEntry {
        LedgerEntry {
            id: "rec-1".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            description: description.to_string(),
            category,
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_empty_ledger_has_header_only() {
        assert_eq!(export_csv(&[]), "Amount,Description,Category,Date\n");
    }

    #[test]
    fn test_rows() {
        let csv = export_csv(&[
            entry("50", "Lunch", Category::Food),
            entry("12.50", "Bus, return", Category::Transport),
            entry("3", "The \"good\" pen", Category::Shopping),
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "50,Lunch,Food,2024-03-05T14:30:00Z");
        assert_eq!(lines[2], "12.50,\"Bus, return\",Transport,2024-03-05T14:30:00Z");
        assert_eq!(lines[3], "3,\"The \"\"good\"\" pen\",Shopping,2024-03-05T14:30:00Z");
    }
}
