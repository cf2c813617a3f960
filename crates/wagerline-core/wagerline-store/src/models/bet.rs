use diesel::prelude::*;

use crate::schema::{bet_resolvers, bets};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bets)]
pub struct BetRow {
    pub id: i64,
    pub creator_id: i64,
    pub title: String,
    pub bet_type: i32,
    pub bet_status: i32,
    pub stake_type: i32,
    /// Set for credit stakes only.
    pub stake_amount: Option<i64>,
    /// Set for social stakes only.
    pub stake_description: Option<String>,
    /// JSON array of option labels; empty for prediction bets.
    pub options_json: String,
    pub deadline: String,
    pub max_participants: Option<i32>,
    pub fulfillment_status: Option<i32>,
    pub resolved_outcome: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: Option<String>,
    pub cancelled_at: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bets)]
pub struct NewBetRow {
    pub creator_id: i64,
    pub title: String,
    pub bet_type: i32,
    pub bet_status: i32,
    pub stake_type: i32,
    pub stake_amount: Option<i64>,
    pub stake_description: Option<String>,
    pub options_json: String,
    pub deadline: String,
    pub max_participants: Option<i32>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = bet_resolvers)]
pub struct BetResolverRow {
    pub bet_id: i64,
    pub user_id: i64,
}
