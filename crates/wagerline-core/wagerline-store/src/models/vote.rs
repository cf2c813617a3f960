use diesel::prelude::*;

use crate::schema::{bet_resolution_vote_winners, bet_resolution_votes};

pub const SELECTION_OUTCOME: i32 = 0;
pub const SELECTION_WINNERS: i32 = 1;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = bet_resolution_votes)]
pub struct VoteRow {
    pub id: i64,
    pub bet_id: i64,
    pub resolver_id: i64,
    pub selection_kind: i32,
    pub chosen_outcome: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = bet_resolution_votes)]
pub struct NewVoteRow {
    pub bet_id: i64,
    pub resolver_id: i64,
    pub selection_kind: i32,
    pub chosen_outcome: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = bet_resolution_vote_winners)]
pub struct VoteWinnerRow {
    pub vote_id: i64,
    pub winner_id: i64,
}
