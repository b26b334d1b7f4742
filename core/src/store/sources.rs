use super::{bool_col, date_col, date_text, num_col, opt_date_col, parsed_col, LeakageStore};
use crate::{
    error::{LeakageError, LeakageResult},
    records::{BillingEvent, Contract, Customer, ProvisioningEvent, SourceTables, UsageEvent},
};
use rusqlite::params;

impl LeakageStore {
    // ── Insert ────────────────────────────────────────────────────

    /// Write every present table in one transaction.
    pub fn insert_sources(&self, sources: &SourceTables) -> LeakageResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        self.insert_contracts(&sources.contracts)?;
        if let Some(customers) = &sources.customers {
            self.insert_customers(customers)?;
        }
        if let Some(provisioning) = &sources.provisioning {
            self.insert_provisioning(provisioning)?;
        }
        if let Some(usage) = &sources.usage {
            self.insert_usage(usage)?;
        }
        if let Some(billing) = &sources.billing {
            self.insert_billing(billing)?;
        }
        tx.commit()?;
        log::debug!("store: inserted {} source rows", sources.total_records());
        Ok(())
    }

    pub fn insert_customers(&self, customers: &[Customer]) -> LeakageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO customers (
                customer_id, customer_name, tier, status, email, phone, address, signup_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for c in customers {
            stmt.execute(params![
                &c.customer_id,
                &c.customer_name,
                c.tier.as_str(),
                c.status.as_str(),
                &c.email,
                &c.phone,
                &c.address,
                date_text(c.signup_date),
            ])?;
        }
        Ok(())
    }

    pub fn insert_contracts(&self, contracts: &[Contract]) -> LeakageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO contracts (
                contract_id, customer_id, service_type, start_date, end_date,
                base_rate, tier_multiplier, contracted_rate, is_promotional,
                promo_expiry_date, usage_based, usage_unit, included_usage, overage_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for c in contracts {
            stmt.execute(params![
                &c.contract_id,
                &c.customer_id,
                &c.service_type,
                date_text(c.start_date),
                date_text(c.end_date),
                c.base_rate,
                c.tier_multiplier,
                c.contracted_rate,
                c.is_promotional,
                c.promo_expiry_date.map(date_text),
                c.usage_based,
                &c.usage_unit,
                c.included_usage,
                c.overage_rate,
            ])?;
        }
        Ok(())
    }

    pub fn insert_provisioning(&self, events: &[ProvisioningEvent]) -> LeakageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO provisioning_events (
                provisioning_id, contract_id, customer_id, action, action_date, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for p in events {
            stmt.execute(params![
                &p.provisioning_id,
                &p.contract_id,
                &p.customer_id,
                &p.action,
                date_text(p.action_date),
                &p.status,
            ])?;
        }
        Ok(())
    }

    pub fn insert_usage(&self, events: &[UsageEvent]) -> LeakageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO usage_events (usage_id, contract_id, usage_date, usage_amount)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for u in events {
            stmt.execute(params![
                &u.usage_id,
                &u.contract_id,
                date_text(u.usage_date),
                u.usage_amount,
            ])?;
        }
        Ok(())
    }

    pub fn insert_billing(&self, events: &[BillingEvent]) -> LeakageResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO billing_events (
                billing_id, contract_id, billing_month, billing_date, base_charge,
                overage_charge, total_amount, status, billing_error_type, rate_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for b in events {
            stmt.execute(params![
                &b.billing_id,
                &b.contract_id,
                &b.billing_month,
                date_text(b.billing_date),
                b.base_charge,
                b.overage_charge,
                b.total_amount,
                &b.status,
                &b.billing_error_type,
                b.rate_error,
            ])?;
        }
        Ok(())
    }

    // ── Load ──────────────────────────────────────────────────────

    /// Load the raw snapshot for one run.
    ///
    /// Contracts are required. An empty optional table loads as `None`
    /// (a missing source), never as an empty list.
    pub fn load_sources(&self) -> LeakageResult<SourceTables> {
        let contracts = self.load_contracts()?;
        if contracts.is_empty() {
            return Err(LeakageError::NoInputData("contracts table is empty".into()));
        }
        Ok(SourceTables {
            contracts,
            customers:    non_empty(self.load_customers()?),
            provisioning: non_empty(self.load_provisioning()?),
            usage:        non_empty(self.load_usage()?),
            billing:      non_empty(self.load_billing()?),
        })
    }

    pub fn load_customers(&self) -> LeakageResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT customer_id, customer_name, tier, status, email, phone, address, signup_date
             FROM customers ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Customer {
                    customer_id:   row.get(0)?,
                    customer_name: row.get(1)?,
                    tier:          parsed_col(row, 2)?,
                    status:        parsed_col(row, 3)?,
                    email:         row.get(4)?,
                    phone:         row.get(5)?,
                    address:       row.get(6)?,
                    signup_date:   date_col(row, 7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_contracts(&self) -> LeakageResult<Vec<Contract>> {
        let mut stmt = self.conn.prepare(
            "SELECT contract_id, customer_id, service_type, start_date, end_date,
                    base_rate, tier_multiplier, contracted_rate, is_promotional,
                    promo_expiry_date, usage_based, usage_unit, included_usage, overage_rate
             FROM contracts ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Contract {
                    contract_id:       row.get(0)?,
                    customer_id:       row.get(1)?,
                    service_type:      row.get(2)?,
                    start_date:        date_col(row, 3)?,
                    end_date:          date_col(row, 4)?,
                    base_rate:         num_col(row, 5)?,
                    tier_multiplier:   num_col(row, 6)?,
                    contracted_rate:   num_col(row, 7)?,
                    is_promotional:    bool_col(row, 8)?,
                    promo_expiry_date: opt_date_col(row, 9)?,
                    usage_based:       bool_col(row, 10)?,
                    usage_unit:        row.get(11)?,
                    included_usage:    num_col(row, 12)?,
                    overage_rate:      num_col(row, 13)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_provisioning(&self) -> LeakageResult<Vec<ProvisioningEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT provisioning_id, contract_id, customer_id, action, action_date, status
             FROM provisioning_events ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProvisioningEvent {
                    provisioning_id: row.get(0)?,
                    contract_id:     row.get(1)?,
                    customer_id:     row.get(2)?,
                    action:          row.get(3)?,
                    action_date:     date_col(row, 4)?,
                    status:          row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_usage(&self) -> LeakageResult<Vec<UsageEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT usage_id, contract_id, usage_date, usage_amount
             FROM usage_events ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(UsageEvent {
                    usage_id:     row.get(0)?,
                    contract_id:  row.get(1)?,
                    usage_date:   date_col(row, 2)?,
                    usage_amount: num_col(row, 3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn load_billing(&self) -> LeakageResult<Vec<BillingEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT billing_id, contract_id, billing_month, billing_date, base_charge,
                    overage_charge, total_amount, status, billing_error_type, rate_error
             FROM billing_events ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BillingEvent {
                    billing_id:         row.get(0)?,
                    contract_id:        row.get(1)?,
                    billing_month:      row.get(2)?,
                    billing_date:       date_col(row, 3)?,
                    base_charge:        num_col(row, 4)?,
                    overage_charge:     num_col(row, 5)?,
                    total_amount:       num_col(row, 6)?,
                    status:             row.get(7)?,
                    billing_error_type: row.get(8)?,
                    rate_error:         bool_col(row, 9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn non_empty<T>(rows: Vec<T>) -> Option<Vec<T>> {
    if rows.is_empty() { None } else { Some(rows) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LeakageStore {
        let store = LeakageStore::in_memory().unwrap();
        store.migrate().unwrap();
        store
    }

    #[test]
    fn null_numbers_and_flags_load_as_zero() {
        let store = store();
        store
            .conn
            .execute_batch(
                "INSERT INTO contracts (contract_id, customer_id, service_type, start_date, end_date, usage_unit)
                 VALUES ('CNT-NULL', 'CUST-1', 'VPN', '2024-01-01', '2025-12-31', 'subscription');
                 INSERT INTO billing_events (billing_id, contract_id, billing_month, billing_date)
                 VALUES ('B-NULL', 'CNT-NULL', '2024-01', '2024-01-01');",
            )
            .unwrap();

        let sources = store.load_sources().unwrap();
        let c = &sources.contracts[0];
        assert_eq!(c.contracted_rate, 0.0);
        assert!(!c.usage_based);
        assert_eq!(c.promo_expiry_date, None);

        let b = &sources.billing.unwrap()[0];
        assert_eq!(b.total_amount, 0.0);
        assert_eq!(b.status, None);
        assert!(!b.rate_error);
        assert_eq!(sources.usage, None);
    }

    #[test]
    fn non_numeric_text_in_number_columns_loads_as_zero() {
        let store = store();
        store
            .conn
            .execute_batch(
                "INSERT INTO contracts (contract_id, customer_id, service_type, start_date, end_date,
                                        base_rate, tier_multiplier, contracted_rate, usage_based, usage_unit)
                 VALUES ('CNT-TEXT', 'CUST-1', 'VPN', '2024-01-01', '2025-12-31',
                         'abc', 1.0, 100, 'yes', 'subscription');",
            )
            .unwrap();

        let sources = store.load_sources().unwrap();
        let c = &sources.contracts[0];
        assert_eq!(c.base_rate, 0.0);
        assert_eq!(c.tier_multiplier, 1.0);
        assert_eq!(c.contracted_rate, 100.0);
        assert!(!c.usage_based);
    }

    #[test]
    fn malformed_dates_fail_the_load() {
        let store = store();
        store
            .conn
            .execute_batch(
                "INSERT INTO contracts (contract_id, customer_id, service_type, start_date, end_date, usage_unit)
                 VALUES ('CNT-BAD', 'CUST-1', 'VPN', '01/02/2024', '2025-12-31', 'subscription');",
            )
            .unwrap();
        assert!(store.load_sources().is_err());
    }
}
