use chrono::NaiveDate;
use ledgerly_core::{AccountId, ImportRow, Money, MAX_AMOUNT_CENTS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::util::collapse_whitespace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvColumnMapping {
    pub date_column: Option<usize>,
    pub description_column: Option<usize>,
    pub amount_column: Option<usize>,
    /// Money leaving the account. Used with `credit_column` when there is no signed amount column.
    pub debit_column: Option<usize>,
    pub credit_column: Option<usize>,
    pub merchant_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvColumnMapping {
    fn default() -> Self {
        Self {
            date_column: Some(0),
            description_column: Some(1),
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            merchant_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvImportProfile {
    pub name: String,
    pub mapping: CsvColumnMapping,
    pub has_header: bool,
    pub delimiter: String,
    /// Applied to every row; `None` lets the account currency win.
    pub currency: Option<String>,
}

impl Default for CsvImportProfile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            mapping: CsvColumnMapping::default(),
            has_header: true,
            delimiter: ",".to_string(),
            currency: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("No data rows")]
    NoDataRows,
}

/// Stable dedup key: sha256 over `date|amount_cents|normalized description`, hex encoded.
pub fn external_id(date: NaiveDate, amount_cents: i64, description: &str) -> String {
    let normalized = collapse_whitespace(&description.to_lowercase());
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", date.format("%Y-%m-%d"), amount_cents, normalized));
    hex::encode(hasher.finalize())
}

pub struct CsvImporter;

impl CsvImporter {
    /// Zero-amount rows are dropped here so they never reach the ledger.
    pub fn parse_profile<R: Read>(
        reader: &mut csv::Reader<R>,
        profile: &CsvImportProfile,
        account_id: AccountId,
    ) -> Result<Vec<ImportRow>, CsvError> {
        let mapping = &profile.mapping;
        let date_col = mapping
            .date_column
            .ok_or_else(|| CsvError::MissingColumn("date_column".to_string()))?;
        let desc_col = mapping
            .description_column
            .ok_or_else(|| CsvError::MissingColumn("description_column".to_string()))?;
        if mapping.amount_column.is_none()
            && (mapping.debit_column.is_none() || mapping.credit_column.is_none())
        {
            return Err(CsvError::MissingColumn(
                "amount_column or debit_column and credit_column".to_string(),
            ));
        }

        let mut rows = Vec::new();
        let mut records = 0usize;
        let mut dropped = 0usize;

        for result in reader.records() {
            let record = result?;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            records += 1;

            let date_field = record
                .get(date_col)
                .ok_or_else(|| CsvError::MissingColumn(format!("date_column {}", date_col)))?;
            let date = parse_date(date_field, &mapping.date_format)?;

            let description = record.get(desc_col).unwrap_or_default().trim().to_string();

            let amount_cents = if let Some(col) = mapping.amount_column {
                parse_amount(record.get(col).unwrap_or_default())?
            } else {
                let field = |col: Option<usize>| {
                    col.and_then(|c| record.get(c))
                        .filter(|s| !s.trim().is_empty())
                        .map(parse_amount)
                        .transpose()
                };
                let debit = field(mapping.debit_column)?.unwrap_or(0);
                let credit = field(mapping.credit_column)?.unwrap_or(0);
                credit.abs() - debit.abs()
            };

            if amount_cents == 0 {
                dropped += 1;
                continue;
            }

            let merchant = mapping
                .merchant_column
                .and_then(|col| record.get(col))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            rows.push(ImportRow {
                account_id,
                date,
                amount_cents,
                external_id: Some(external_id(date, amount_cents, &description)),
                description,
                merchant,
                currency: profile.currency.clone(),
            });
        }

        if records == 0 {
            return Err(CsvError::NoDataRows);
        }
        debug!(
            profile = %profile.name,
            parsed = rows.len(),
            dropped_zero = dropped,
            "parsed csv"
        );
        Ok(rows)
    }
}

fn parse_date(s: &str, format: &str) -> Result<NaiveDate, CsvError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &[
        "%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y",
    ] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(CsvError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<i64, CsvError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', '€', '£', ' '], "");
    let mut dec = Decimal::from_str(&s).map_err(|_| CsvError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Money::from_decimal(dec)
        .to_cents()
        .filter(|cents| cents.unsigned_abs() <= MAX_AMOUNT_CENTS.unsigned_abs())
        .ok_or_else(|| CsvError::InvalidAmount(s.to_string()))
}

pub fn import_csv<R: Read>(
    data: R,
    profile: &CsvImportProfile,
    account_id: AccountId,
) -> Result<Vec<ImportRow>, CsvError> {
    let delimiter = profile
        .delimiter
        .as_bytes()
        .first()
        .copied()
        .unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(profile.has_header)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(data);

    CsvImporter::parse_profile(&mut reader, profile, account_id)
}

/// One line of a transaction export, already resolved to display names.
#[derive(Debug, Clone, Serialize)]
pub struct CsvExportRow {
    pub date: NaiveDate,
    pub description: String,
    pub merchant: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub category: Option<String>,
    pub account: String,
    pub notes: Option<String>,
}

pub const EXPORT_HEADER: [&str; 8] = [
    "Date",
    "Description",
    "Merchant",
    "Amount",
    "Currency",
    "Category",
    "Account",
    "Notes",
];

pub fn export_csv<W: Write>(out: W, rows: &[CsvExportRow]) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(EXPORT_HEADER)?;
    for row in rows {
        let date = row.date.format("%Y-%m-%d").to_string();
        let amount = Money::from_cents(row.amount_cents).to_string();
        writer.write_record([
            date.as_str(),
            row.description.as_str(),
            row.merchant.as_deref().unwrap_or_default(),
            amount.as_str(),
            row.currency.as_str(),
            row.category.as_deref().unwrap_or_default(),
            row.account.as_str(),
            row.notes.as_deref().unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45").unwrap(), 12345);
    }

    #[test]
    fn parse_amount_with_currency_symbols() {
        assert_eq!(parse_amount("$99.99").unwrap(), 9999);
        assert_eq!(parse_amount("€ 15.99").unwrap(), 1599);
    }

    #[test]
    fn parse_amount_with_commas() {
        assert_eq!(parse_amount("1,234.56").unwrap(), 123456);
    }

    #[test]
    fn parse_amount_negative_and_parens() {
        assert_eq!(parse_amount("-50.00").unwrap(), -5000);
        assert_eq!(parse_amount("(75.25)").unwrap(), -7525);
    }

    #[test]
    fn parse_amount_rounds_half_away_from_zero() {
        assert_eq!(parse_amount("0.005").unwrap(), 1);
        assert_eq!(parse_amount("-0.005").unwrap(), -1);
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("not_a_number").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn parse_amount_rejects_out_of_range_values() {
        assert!(parse_amount("10000000000000.01").is_err());
        assert_eq!(parse_amount("-10000000000000.00").unwrap(), -MAX_AMOUNT_CENTS);
        assert!(parse_amount("79228162514264337593543950335").is_err());
    }

    #[test]
    fn parse_date_fallbacks() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15", "%Y-%m-%d").unwrap(), expected);
        assert_eq!(parse_date("15.01.2024", "%Y-%m-%d").unwrap(), expected);
        assert_eq!(parse_date("01/15/2024", "%Y-%m-%d").unwrap(), expected);
        assert!(parse_date("not-a-date", "%Y-%m-%d").is_err());
    }

    #[test]
    fn external_id_ignores_case_and_spacing() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = external_id(d, -500, "Coffee  Shop ");
        let b = external_id(d, -500, "coffee shop");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, external_id(d, -501, "coffee shop"));
    }

    #[test]
    fn import_csv_basic() {
        let data = b"date,description,amount\n2024-01-15,AMAZON,49.99\n2024-01-16,STARBUCKS,-5.00\n";
        let rows = import_csv(data.as_ref(), &CsvImportProfile::default(), AccountId(7)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount_cents, 4999);
        assert_eq!(rows[0].description, "AMAZON");
        assert_eq!(rows[0].account_id, AccountId(7));
        assert!(rows[0].external_id.is_some());
        assert_eq!(rows[1].amount_cents, -500);
    }

    #[test]
    fn import_csv_drops_zero_rows() {
        let data = b"date,description,amount\n2024-01-15,FEE WAIVED,0.00\n2024-01-16,STARBUCKS,-5.00\n";
        let rows = import_csv(data.as_ref(), &CsvImportProfile::default(), AccountId(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "STARBUCKS");
    }

    #[test]
    fn import_csv_debit_credit_and_merchant() {
        let data = b"date;description;debit;credit;payee\n2024-01-15;PAYMENT;;100.00;ACME\n2024-01-16;CHARGE;50.00;;\n";
        let profile = CsvImportProfile {
            delimiter: ";".to_string(),
            mapping: CsvColumnMapping {
                amount_column: None,
                debit_column: Some(2),
                credit_column: Some(3),
                merchant_column: Some(4),
                ..CsvColumnMapping::default()
            },
            ..CsvImportProfile::default()
        };
        let rows = import_csv(data.as_ref(), &profile, AccountId(1)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount_cents, 10000);
        assert_eq!(rows[0].merchant.as_deref(), Some("ACME"));
        assert_eq!(rows[1].amount_cents, -5000);
        assert_eq!(rows[1].merchant, None);
    }

    #[test]
    fn import_csv_no_data_rows_errors() {
        let data = b"date,description,amount\n";
        let result = import_csv(data.as_ref(), &CsvImportProfile::default(), AccountId(1));
        assert!(matches!(result, Err(CsvError::NoDataRows)));
    }

    #[test]
    fn export_quotes_and_formats_amounts() {
        let rows = vec![CsvExportRow {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: "Dinner, with \"friends\"".to_string(),
            merchant: None,
            amount_cents: -4250,
            currency: "EUR".to_string(),
            category: Some("Restaurants".to_string()),
            account: "Checking".to_string(),
            notes: None,
        }];
        let mut buf = Vec::new();
        export_csv(&mut buf, &rows).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Description,Merchant,Amount,Currency,Category,Account,Notes")
        );
        assert_eq!(
            lines.next(),
            Some("2024-03-01,\"Dinner, with \"\"friends\"\"\",,-42.50,EUR,Restaurants,Checking,")
        );
    }
}
