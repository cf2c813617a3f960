use diesel::prelude::*;

use crate::schema::bet_fulfillments;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bet_fulfillments)]
pub struct FulfillmentRow {
    pub id: i64,
    pub bet_id: i64,
    pub winner_id: i64,
    pub notes: Option<String>,
    pub confirmed_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bet_fulfillments)]
pub struct NewFulfillmentRow {
    pub bet_id: i64,
    pub winner_id: i64,
    pub notes: Option<String>,
    pub confirmed_at: String,
}
