use diesel::prelude::*;

use crate::schema::bet_participations;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bet_participations)]
pub struct ParticipationRow {
    pub id: i64,
    pub bet_id: i64,
    pub user_id: i64,
    pub chosen_option: Option<String>,
    pub predicted_value: Option<String>,
    pub stake_amount: i64,
    pub outcome: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bet_participations)]
pub struct NewParticipationRow {
    pub bet_id: i64,
    pub user_id: i64,
    pub chosen_option: Option<String>,
    pub predicted_value: Option<String>,
    pub stake_amount: i64,
    pub outcome: i32,
    pub created_at: String,
}
