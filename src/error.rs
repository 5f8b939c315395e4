use thiserror::Error;

/// Faults raised by local operations on the room and round state.
///
/// None of these ever travel over the wire: an invalid action is rejected
/// on the device that attempted it and the shared state stays untouched.
#[derive(Error, PartialEq, Debug)]
pub enum EngineError {
    #[error("only the host may do this")]
    NotHost,
    #[error("only the acting team's clue-giver may do this")]
    NotClueGiver,
    #[error("it is not your team's turn")]
    NotYourTurn,
    #[error("clue and word count must both be set first")]
    ClueMissing,
    #[error("a clue field was left empty")]
    EmptyClue,
    #[error("card {0} does not exist")]
    CardOutOfRange(usize),
    #[error("card {0} has already been selected")]
    CardAlreadySelected(usize),
    #[error("the round is already over")]
    RoundOver,
    #[error("no round is in progress")]
    NoRound,
    #[error("the game cannot start yet: {0}")]
    CannotStartGame(String),
    #[error("teams are fixed in this mode")]
    TeamLocked,
    #[error("the session has shut down")]
    SessionClosed,
}
