use diesel::prelude::*;

use crate::schema::{account_balances, ledger_transactions};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = account_balances)]
pub struct BalanceRow {
    pub user_id: i64,
    pub balance: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = ledger_transactions)]
pub struct LedgerRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: i32,
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub correlation_id: Vec<u8>,
    pub bet_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = ledger_transactions)]
pub struct NewLedgerRow {
    pub user_id: i64,
    pub kind: i32,
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub correlation_id: Vec<u8>,
    pub bet_id: Option<i64>,
    pub created_at: String,
}
