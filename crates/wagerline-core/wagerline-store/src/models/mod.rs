pub mod bet;
pub mod fulfillment;
pub mod ledger;
pub mod participation;
pub mod vote;

pub use bet::{BetResolverRow, BetRow, NewBetRow};
pub use fulfillment::{FulfillmentRow, NewFulfillmentRow};
pub use ledger::{BalanceRow, LedgerRow, NewLedgerRow};
pub use participation::{NewParticipationRow, ParticipationRow};
pub use vote::{NewVoteRow, VoteRow, VoteWinnerRow};
