//! Fixed-rate amortization. Every figure is rounded to whole cents per row so
//! the schedule sums exactly to the principal.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::money::Money;

const MAX_TERM_MONTHS: u32 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub month: u32,
    pub date: NaiveDate,
    pub payment_cents: i64,
    pub principal_cents: i64,
    pub interest_cents: i64,
    pub balance_cents: i64,
    pub total_interest_cents: i64,
    pub total_principal_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MortgageSchedule {
    pub monthly_payment_cents: i64,
    pub total_payment_cents: i64,
    pub total_interest_cents: i64,
    pub rows: Vec<AmortizationRow>,
}

/// `annual_rate` is a fraction (`0.065` for 6.5%).
pub fn amortize(
    principal_cents: i64,
    annual_rate: Decimal,
    term_months: u32,
    start_date: NaiveDate,
    extra_payment_cents: i64,
) -> Result<MortgageSchedule, LedgerError> {
    if principal_cents <= 0 {
        return Err(LedgerError::validation("principal must be positive"));
    }
    if term_months == 0 || term_months > MAX_TERM_MONTHS {
        return Err(LedgerError::validation(format!(
            "term must be within 1..={MAX_TERM_MONTHS} months"
        )));
    }
    if annual_rate.is_sign_negative() || annual_rate >= Decimal::ONE {
        return Err(LedgerError::validation("annual rate must be within [0, 1)"));
    }
    if extra_payment_cents < 0 {
        return Err(LedgerError::validation("extra payment must not be negative"));
    }

    let monthly_rate = annual_rate / Decimal::from(12);
    let principal = Money::from_cents(principal_cents).as_decimal();
    let payment = if monthly_rate.is_zero() {
        principal / Decimal::from(term_months)
    } else {
        // M = P * r(1+r)^n / ((1+r)^n - 1)
        let growth = pow(Decimal::ONE + monthly_rate, term_months)?;
        principal * monthly_rate * growth / (growth - Decimal::ONE)
    };
    let monthly_payment_cents = to_cents(Money::from_decimal(payment))?;

    let mut rows = Vec::new();
    let mut balance = principal_cents;
    let mut total_interest = 0i64;
    let mut total_principal = 0i64;

    for month in 1..=term_months {
        if balance <= 0 {
            break;
        }
        let interest = to_cents(Money::from_decimal(
            Money::from_cents(balance).as_decimal() * monthly_rate,
        ))?;
        let mut principal_part = monthly_payment_cents - interest + extra_payment_cents;
        if principal_part > balance || month == term_months {
            principal_part = balance;
        }
        balance -= principal_part;
        total_interest += interest;
        total_principal += principal_part;

        let date = start_date
            .checked_add_months(Months::new(month))
            .ok_or_else(|| LedgerError::validation("schedule runs past the calendar"))?;

        rows.push(AmortizationRow {
            month,
            date,
            payment_cents: principal_part + interest,
            principal_cents: principal_part,
            interest_cents: interest,
            balance_cents: balance,
            total_interest_cents: total_interest,
            total_principal_cents: total_principal,
        });
    }

    Ok(MortgageSchedule {
        monthly_payment_cents,
        total_payment_cents: total_principal + total_interest,
        total_interest_cents: total_interest,
        rows,
    })
}

fn pow(base: Decimal, exp: u32) -> Result<Decimal, LedgerError> {
    let mut acc = Decimal::ONE;
    for _ in 0..exp {
        acc = acc
            .checked_mul(base)
            .ok_or_else(|| LedgerError::validation("rate and term overflow"))?;
    }
    Ok(acc)
}

fn to_cents(value: Money) -> Result<i64, LedgerError> {
    value
        .to_cents()
        .ok_or_else(|| LedgerError::validation("amount out of range"))
}
