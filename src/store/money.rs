use chrono::NaiveDate;
use std::rc::Rc;
use tracing::{error, info, warn};

use super::cache::{EntityCache, LoadState};
use super::{Link, StoreError, StoreResult, require_text, user_of};
use crate::gateway::Gateway;
use crate::models::{
    CategoryKind, NewCategory, NewTransaction, ProfilePatch, Transaction, TransactionCategory,
    TransactionPatch,
};
use crate::relay::Relay;
use crate::views::finance::{self, Totals};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Categories every new user starts with
pub const DEFAULT_CATEGORIES: [(&str, CategoryKind); 8] = [
    ("Salary", CategoryKind::Income),
    ("Freelance", CategoryKind::Income),
    ("Housing", CategoryKind::Expense),
    ("Food", CategoryKind::Expense),
    ("Transport", CategoryKind::Expense),
    ("Entertainment", CategoryKind::Expense),
    ("Utilities", CategoryKind::Expense),
    ("Other", CategoryKind::Expense),
];

/// Three-letter upper-case currency code, e.g. `EUR`
pub fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

pub(crate) fn check_amount(amount: f64) -> StoreResult<()> {
    if !amount.is_finite() || amount == 0.0 {
        return Err(StoreError::Validation("amount must be a non-zero number".to_string()));
    }
    Ok(())
}

pub struct MoneyManager {
    gateway: Rc<dyn Gateway>,
    transactions: EntityCache<Transaction>,
    categories: EntityCache<TransactionCategory>,
    link: Option<Link>,
    category_link: Option<Link>,
    currency: String,
}

impl MoneyManager {
    pub fn new(gateway: Rc<dyn Gateway>) -> Self {
        Self {
            gateway,
            transactions: EntityCache::with_order(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id))),
            categories: EntityCache::with_order(|a, b| a.id.cmp(&b.id)),
            link: None,
            category_link: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Load transactions, categories and the saved currency. A user with no
    /// categories gets the default set persisted.
    pub fn attach(&mut self, user_id: &str, relay: &Relay) {
        self.detach();
        let gateway = Rc::clone(&self.gateway);
        self.link = Some(Link::open(&mut self.transactions, relay, user_id, || {
            gateway.list_transactions(user_id)
        }));
        self.category_link = Some(Link::open(&mut self.categories, relay, user_id, || {
            gateway.list_categories(user_id)
        }));

        if self.categories.items().is_empty() {
            let defaults: Vec<NewCategory> = DEFAULT_CATEGORIES
                .iter()
                .map(|(name, kind)| NewCategory {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect();
            match self.gateway.create_categories(&defaults, user_id) {
                Ok(created) => {
                    info!("Seeded {} default categories", created.len());
                    for category in created {
                        self.categories.upsert(category);
                    }
                }
                Err(e) => error!("Failed to seed default categories: {}", e),
            }
        }

        match self.gateway.get_profile(user_id) {
            Ok(Some(profile)) => {
                if let Some(currency) = profile.currency {
                    self.currency = currency;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Could not load saved currency, using {}: {}", self.currency, e),
        }
    }

    pub fn detach(&mut self) {
        self.category_link = None;
        if self.link.take().is_some() {
            self.transactions.clear();
            self.categories.clear();
        }
        self.currency = DEFAULT_CURRENCY.to_string();
    }

    pub fn state(&self) -> LoadState {
        self.transactions.state()
    }

    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        if let Some(link) = &self.link {
            applied += link.pump(&mut self.transactions);
        }
        if let Some(link) = &self.category_link {
            applied += link.pump(&mut self.categories);
        }
        applied
    }

    /// Every transaction regardless of currency, newest first
    pub fn all_transactions(&self) -> &[Transaction] {
        self.transactions.items()
    }

    /// Transactions in the selected currency, newest first
    pub fn transactions(&self) -> Vec<&Transaction> {
        finance::in_currency(self.transactions.items(), &self.currency)
    }

    pub fn categories(&self) -> &[TransactionCategory] {
        self.categories.items()
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn totals(&self) -> Totals {
        finance::totals(self.transactions().into_iter())
    }

    /// Switch the active currency. The choice is saved to the profile
    /// before it takes effect locally.
    pub fn set_currency(&mut self, currency: &str) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        if !is_currency_code(currency) {
            return Err(StoreError::Validation(format!("'{}' is not a currency code", currency)));
        }
        let patch = ProfilePatch {
            currency: Some(Some(currency.to_string())),
            ..ProfilePatch::default()
        };
        self.gateway.upsert_profile(&patch, user_id)?;
        self.currency = currency.to_string();
        Ok(())
    }

    /// Record a transaction in the selected currency. `amount` is signed:
    /// positive for income, negative for an expense.
    pub fn add_transaction(
        &mut self,
        date: NaiveDate,
        description: &str,
        amount: f64,
        category: &str,
    ) -> StoreResult<Transaction> {
        let user_id = user_of(&self.link)?;
        require_text(category, "category")?;
        check_amount(amount)?;

        let transaction = NewTransaction {
            date,
            description: description.to_string(),
            amount,
            category: category.to_string(),
            currency: self.currency.clone(),
        };
        let created = self.gateway.create_transaction(&transaction, user_id)?;
        self.transactions.upsert(created.clone());
        Ok(created)
    }

    pub fn update_transaction(&mut self, id: i64, patch: &TransactionPatch) -> StoreResult<Transaction> {
        let user_id = user_of(&self.link)?;
        if let Some(amount) = patch.amount {
            check_amount(amount)?;
        }
        if let Some(currency) = &patch.currency {
            if !is_currency_code(currency) {
                return Err(StoreError::Validation(format!("'{}' is not a currency code", currency)));
            }
        }
        let updated = self.gateway.update_transaction(id, patch, user_id)?;
        self.transactions.upsert(updated.clone());
        Ok(updated)
    }

    pub fn delete_transaction(&mut self, id: i64) -> StoreResult<()> {
        let user_id = user_of(&self.link)?;
        self.gateway.delete_transaction(id, user_id)?;
        self.transactions.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn attached() -> (Rc<Database>, MoneyManager) {
        let relay = Relay::new();
        let db = Rc::new(Database::open_in_memory(relay.clone()).unwrap());
        let mut manager = MoneyManager::new(db.clone());
        manager.attach("alice", &relay);
        (db, manager)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn test_default_categories_are_persisted_once() {
        let (db, manager) = attached();
        assert_eq!(manager.categories().len(), 8);
        assert_eq!(manager.categories()[0].name, "Salary");
        assert_eq!(db.list_categories("alice").unwrap().len(), 8);

        let relay = db.relay().clone();
        let mut again = MoneyManager::new(db.clone());
        again.attach("alice", &relay);
        assert_eq!(db.list_categories("alice").unwrap().len(), 8);
    }

    #[test]
    fn test_expense_changes_only_expense_total() {
        let (_db, mut manager) = attached();
        manager.add_transaction(day(1), "Paycheck", 1000.0, "Salary").unwrap();
        let before = manager.totals();

        manager.add_transaction(day(2), "Groceries", -42.50, "Food").unwrap();
        let after = manager.totals();
        assert_eq!(after.expenses.abs() - before.expenses.abs(), 42.50);
        assert_eq!(after.income, before.income);
        assert_eq!(after.balance, 957.50);
    }

    #[test]
    fn test_currency_switch_is_saved_and_filters() {
        let (db, mut manager) = attached();
        manager.add_transaction(day(1), "Lunch", -12.0, "Food").unwrap();
        manager.set_currency("EUR").unwrap();
        manager.add_transaction(day(2), "Metro", -2.0, "Transport").unwrap();

        assert_eq!(manager.transactions().len(), 1);
        assert_eq!(manager.totals().expenses, -2.0);
        assert_eq!(manager.all_transactions().len(), 2);
        assert_eq!(db.get_profile("alice").unwrap().unwrap().currency.as_deref(), Some("EUR"));

        assert!(matches!(manager.set_currency("euro"), Err(StoreError::Validation(_))));
        assert_eq!(manager.currency(), "EUR");
    }

    #[test]
    fn test_saved_currency_loaded_on_attach() {
        let (db, mut manager) = attached();
        manager.set_currency("JPY").unwrap();
        manager.detach();
        assert_eq!(manager.currency(), DEFAULT_CURRENCY);

        let relay = db.relay().clone();
        manager.attach("alice", &relay);
        assert_eq!(manager.currency(), "JPY");
    }

    #[test]
    fn test_rejects_zero_amount() {
        let (_db, mut manager) = attached();
        assert!(manager.add_transaction(day(1), "Nothing", 0.0, "Other").is_err());
        assert!(manager.add_transaction(day(1), "NaN", f64::NAN, "Other").is_err());
    }
}
