use chrono::{Datelike, Duration, NaiveDate};
use clap::ValueEnum;
use std::collections::HashMap;

use crate::models::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    /// Sum of signed amounts
    pub balance: f64,
    /// Sum of positive amounts
    pub income: f64,
    /// Sum of negative amounts (zero or negative)
    pub expenses: f64,
}

pub fn in_currency<'a>(transactions: &'a [Transaction], currency: &str) -> Vec<&'a Transaction> {
    transactions.iter().filter(|t| t.currency == currency).collect()
}

pub fn totals<'a>(transactions: impl Iterator<Item = &'a Transaction>) -> Totals {
    transactions.fold(Totals::default(), |mut acc, t| {
        acc.balance += t.amount;
        if t.amount > 0.0 {
            acc.income += t.amount;
        } else {
            acc.expenses += t.amount;
        }
        acc
    })
}

/// Totals over the 30 days up to and including `today`
pub fn last_30_days(transactions: &[&Transaction], today: NaiveDate) -> Totals {
    let since = today - Duration::days(30);
    totals(transactions.iter().copied().filter(|t| t.date >= since && t.date <= today))
}

/// Totals for the calendar month containing `today`
pub fn this_month(transactions: &[&Transaction], today: NaiveDate) -> Totals {
    totals(
        transactions
            .iter()
            .copied()
            .filter(|t| t.date.year() == today.year() && t.date.month() == today.month()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TypeFilter {
    #[default]
    All,
    Income,
    Expense,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub kind: TypeFilter,
    pub category: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Case-insensitive match against description and category
    pub search: Option<String>,
}

impl TransactionFilter {
    pub fn matches(&self, t: &Transaction) -> bool {
        match self.kind {
            TypeFilter::Income if t.amount <= 0.0 => return false,
            TypeFilter::Expense if t.amount >= 0.0 => return false,
            _ => {}
        }
        if self.category.as_ref().is_some_and(|c| *c != t.category) {
            return false;
        }
        if self.from.is_some_and(|from| t.date < from) || self.to.is_some_and(|to| t.date > to) {
            return false;
        }
        if let Some(search) = &self.search {
            let haystack = format!("{} {}", t.description, t.category).to_lowercase();
            if !haystack.contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }

    pub fn apply<'a>(&self, transactions: &[&'a Transaction]) -> Vec<&'a Transaction> {
        transactions.iter().copied().filter(|t| self.matches(t)).collect()
    }
}

/// Income and expense per month for the twelve months ending with the
/// month of `today`, oldest first, rounded to whole units.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlySeries {
    pub months: Vec<String>,
    pub income: Vec<f64>,
    pub expenses: Vec<f64>,
}

fn month_key(year: i32, month: u32) -> String {
    format!("{}-{:02}", year, month)
}

pub fn monthly_series(transactions: &[&Transaction], today: NaiveDate) -> MonthlySeries {
    let current = today.year() * 12 + today.month0() as i32;
    let months: Vec<String> = (0..12)
        .rev()
        .map(|back| {
            let index = current - back;
            month_key(index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect();

    let mut sums: HashMap<&str, (f64, f64)> = months.iter().map(|m| (m.as_str(), (0.0, 0.0))).collect();
    for t in transactions {
        let key = month_key(t.date.year(), t.date.month());
        if let Some((income, expense)) = sums.get_mut(key.as_str()) {
            if t.amount >= 0.0 {
                *income += t.amount;
            } else {
                *expense += t.amount.abs();
            }
        }
    }

    let income = months.iter().map(|m| sums[m.as_str()].0.round()).collect();
    let expenses = months.iter().map(|m| sums[m.as_str()].1.round()).collect();
    MonthlySeries { months, income, expenses }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Share of the last 30 days' income not spent, 0-100
    pub savings_rate_pct: u32,
    pub last_30_expenses: f64,
    pub average_abs: f64,
    /// Category with the largest absolute volume
    pub top_category: Option<String>,
}

pub fn metrics(transactions: &[&Transaction], today: NaiveDate) -> Metrics {
    let recent = last_30_days(transactions, today);
    let last_30_expenses = recent.expenses.abs();
    let savings = if recent.income > 0.0 {
        (1.0 - last_30_expenses / recent.income).max(0.0) * 100.0
    } else {
        0.0
    };

    let mut volume: HashMap<&str, f64> = HashMap::new();
    let mut sum_abs = 0.0;
    for t in transactions {
        sum_abs += t.amount.abs();
        *volume.entry(t.category.as_str()).or_default() += t.amount.abs();
    }
    let top_category = volume
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(name, _)| name.to_string());

    Metrics {
        savings_rate_pct: savings.round() as u32,
        last_30_expenses,
        average_abs: if transactions.is_empty() { 0.0 } else { sum_abs / transactions.len() as f64 },
        top_category,
    }
}

/// Last 30 days' spending as a percentage of `monthly_budget`, capped at
/// 100. `None` without a positive budget.
pub fn budget_utilization(last_30_expenses: f64, monthly_budget: f64) -> Option<u32> {
    if monthly_budget.is_nan() || monthly_budget <= 0.0 {
        return None;
    }
    let pct = (last_30_expenses.abs() / monthly_budget * 100.0).round();
    Some(pct.min(100.0) as u32)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// CSV with a header row: Date,Description,Category,Amount,Currency
pub fn to_csv(transactions: &[&Transaction]) -> String {
    let mut lines = vec!["Date,Description,Category,Amount,Currency".to_string()];
    for t in transactions {
        let fields = [
            t.date.format("%Y-%m-%d").to_string(),
            t.description.replace('\n', " "),
            t.category.clone(),
            format!("{:.2}", t.amount),
            t.currency.clone(),
        ];
        lines.push(fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(","));
    }
    lines.join("\n")
}
